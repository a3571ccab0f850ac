//! # Backend Handles
//!
//! A [`BackendHandle`] is a [`StorageBackend`] scoped to one attachment, plus that
//! attachment's pending writes and deletes for the backend. The attachment hands
//! each handle a copied snapshot before a flush; the handle empties its pending
//! state on every flush, successful or not, and keeps nothing afterwards.
//!
//! Staged sources (the local files pending bytes were read from) are released
//! by exactly one handle per attachment: the one with `owns_source_teardown`.
//! The primary owns teardown and flushes last, so the secondary can read the
//! same snapshot first without the sources disappearing under it.

use crate::backend::{BackendKind, StorageBackend};
use crate::error::Result;
use crate::model::{ObjectKey, PendingWrite, PendingWrites};
use bytes::Bytes;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Secondary => f.write_str("secondary"),
        }
    }
}

pub struct BackendHandle {
    backend: Box<dyn StorageBackend>,
    role: Role,
    owns_source_teardown: bool,
    pending_writes: PendingWrites,
    pending_deletes: Vec<ObjectKey>,
}

impl BackendHandle {
    /// The always-present local handle. Owns source teardown.
    pub fn primary(backend: Box<dyn StorageBackend>) -> Self {
        Self::new(backend, Role::Primary, true)
    }

    /// The alternate handle. Never touches staged sources.
    pub fn secondary(backend: Box<dyn StorageBackend>) -> Self {
        Self::new(backend, Role::Secondary, false)
    }

    fn new(backend: Box<dyn StorageBackend>, role: Role, owns_source_teardown: bool) -> Self {
        Self {
            backend,
            role,
            owns_source_teardown,
            pending_writes: PendingWrites::new(),
            pending_deletes: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn owns_source_teardown(&self) -> bool {
        self.owns_source_teardown
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    // --- Pending state ---

    pub fn pending_writes(&self) -> &PendingWrites {
        &self.pending_writes
    }

    /// Replace the pending writes with `snapshot`.
    pub fn set_pending_writes(&mut self, snapshot: PendingWrites) {
        self.pending_writes = snapshot;
    }

    pub fn pending_deletes(&self) -> &[ObjectKey] {
        &self.pending_deletes
    }

    pub fn queue_some_for_delete<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = ObjectKey>,
    {
        for key in keys {
            if !self.pending_deletes.contains(&key) {
                self.pending_deletes.push(key);
            }
        }
    }

    /// Drop pending writes without writing them, still releasing staged
    /// sources if this handle owns them.
    pub fn discard_pending_writes(&mut self) {
        let pending = std::mem::take(&mut self.pending_writes);
        if self.owns_source_teardown {
            release_sources(pending.values());
        }
    }

    pub fn discard_pending_deletes(&mut self) {
        self.pending_deletes.clear();
    }

    // --- Flush ---

    /// Write every pending object. Stops at the first failure; pending state is
    /// empty afterwards either way.
    pub fn flush_writes(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending_writes);
        let result = self.write_all(&pending);
        if self.owns_source_teardown {
            release_sources(pending.values());
        }
        result
    }

    fn write_all(&self, pending: &PendingWrites) -> Result<usize> {
        for (key, write) in pending {
            self.backend.write(key, &write.content)?;
            debug!(role = %self.role, backend = %self.kind(), key = %key, "queued write flushed");
        }
        Ok(pending.len())
    }

    /// Delete every pending key. Stops at the first failure; pending state is
    /// empty afterwards either way.
    pub fn flush_deletes(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending_deletes);
        for key in &pending {
            self.backend.delete(key)?;
            debug!(role = %self.role, backend = %self.kind(), key = %key, "queued delete flushed");
        }
        Ok(pending.len())
    }

    // --- Reads ---

    pub fn exists(&self, key: &ObjectKey) -> Result<bool> {
        self.backend.exists(key)
    }

    pub fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>> {
        self.backend.read(key)
    }

    pub fn path(&self, key: &ObjectKey) -> PathBuf {
        self.backend.path(key)
    }

    pub fn url(&self, key: &ObjectKey) -> String {
        self.backend.url(key)
    }

    pub fn copy_to_local_file(&self, key: &ObjectKey, dest: &Path) -> Result<()> {
        self.backend.copy_to_local_file(key, dest)
    }

    pub fn public_url(&self, key: &ObjectKey) -> Result<String> {
        self.backend.public_url(key)
    }

    pub fn expiring_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
        self.backend.expiring_url(key, expires_in)
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("role", &self.role)
            .field("kind", &self.kind())
            .field("owns_source_teardown", &self.owns_source_teardown)
            .field("pending_writes", &self.pending_writes.len())
            .field("pending_deletes", &self.pending_deletes.len())
            .finish()
    }
}

/// Remove staged source files. A source that is already gone is fine; any other
/// failure is logged and ignored since the bytes are already stored.
pub(crate) fn release_sources<'a, I>(writes: I)
where
    I: IntoIterator<Item = &'a PendingWrite>,
{
    for path in writes.into_iter().filter_map(|w| w.staged.as_ref()) {
        match fs::remove_file(path) {
            Ok(()) => debug!(source = %path.display(), "released staged source"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(source = %path.display(), error = %err, "failed to release staged source")
            }
        }
    }
}
