use super::{expiry_timestamp, BackendKind, StorageBackend};
use crate::error::{Result, TwinError};
use crate::model::ObjectKey;
use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// One recorded backend call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub backend: String,
    pub op: &'static str,
    pub key: String,
}

/// Call log shared between backends, used to assert cross-backend ordering.
pub type Journal = Rc<RefCell<Vec<JournalEntry>>>;

/// In-memory storage backend.
///
/// Uses `RefCell` for interior mutability since attachments are single-threaded.
/// Behaves like a remote bucket: URLs are rooted at `base_url` and public and
/// expiring URLs are available.
pub struct MemBackend {
    label: String,
    base_url: String,
    objects: RefCell<BTreeMap<String, Bytes>>,
    journal: Option<Journal>,
    simulate_write_error: Cell<bool>,
    simulate_delete_error: Cell<bool>,
}

impl MemBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            label: "memory".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: RefCell::new(BTreeMap::new()),
            journal: None,
            simulate_write_error: Cell::new(false),
            simulate_delete_error: Cell::new(false),
        }
    }

    /// Record every write and delete into `journal` under `label`.
    pub fn with_journal(mut self, label: &str, journal: Journal) -> Self {
        self.label = label.to_string();
        self.journal = Some(journal);
        self
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.set(simulate);
    }

    /// Enable delete error simulation for testing error handling.
    pub fn set_simulate_delete_error(&self, simulate: bool) {
        self.simulate_delete_error.set(simulate);
    }

    pub fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Bytes> {
        self.objects.borrow().get(&key.relative_path()).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.borrow().keys().cloned().collect()
    }

    fn record(&self, op: &'static str, key: &ObjectKey) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push(JournalEntry {
                backend: self.label.clone(),
                op,
                key: key.relative_path(),
            });
        }
    }
}

impl StorageBackend for MemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn write(&self, key: &ObjectKey, content: &[u8]) -> Result<()> {
        self.record("write", key);
        if self.simulate_write_error.get() {
            return Err(TwinError::Store("Simulated write error".to_string()));
        }
        self.objects
            .borrow_mut()
            .insert(key.relative_path(), Bytes::copy_from_slice(content));
        Ok(())
    }

    fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>> {
        Ok(self.get(key))
    }

    fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.record("delete", key);
        if self.simulate_delete_error.get() {
            return Err(TwinError::Store("Simulated delete error".to_string()));
        }
        self.objects.borrow_mut().remove(&key.relative_path());
        Ok(())
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool> {
        Ok(self.objects.borrow().contains_key(&key.relative_path()))
    }

    fn path(&self, key: &ObjectKey) -> PathBuf {
        PathBuf::from(key.relative_path())
    }

    fn url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.base_url, key.relative_path())
    }

    fn public_url(&self, key: &ObjectKey) -> Result<String> {
        Ok(self.url(key))
    }

    fn expiring_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
        let expires = expiry_timestamp(expires_in)?;
        Ok(format!("{}?expires={}", self.url(key), expires))
    }
}
