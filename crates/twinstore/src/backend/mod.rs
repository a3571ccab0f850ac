//! # Storage Backends
//!
//! [`StorageBackend`] is the narrow capability every store must provide. It handles
//! the "where" of storage (local disk, object store, memory), while
//! [`crate::handle::BackendHandle`] carries the pending state of one attachment and
//! [`crate::attachment::Attachment`] decides which backend sees what.
//!
//! ## Implementations
//!
//! - [`fs_backend::FsBackend`]: the primary store. Atomic writes under a root directory.
//! - [`remote::ObjectStoreBackend`]: the alternate store, any [`object_store::ObjectStore`]
//!   driven through a blocking bridge.
//! - [`mem_backend::MemBackend`]: in-memory store with failure injection, for tests.
//!
//! All keys share one layout (see [`ObjectKey::relative_path`]) so an object
//! written to either backend can be found on the other at the same path.

use crate::error::{Result, TwinError};
use crate::model::ObjectKey;
use bytes::Bytes;
use chrono::Utc;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub mod fs_backend;
pub mod mem_backend;
pub mod remote;

pub use fs_backend::FsBackend;
pub use mem_backend::MemBackend;
pub use remote::ObjectStoreBackend;

/// Which kind of store a backend is. Used to pick the alternate store and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Filesystem,
    ObjectStore,
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::ObjectStore => "object_store",
            BackendKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Abstract interface for raw attachment storage.
///
/// All methods take `&self`; implementations that keep state use interior
/// mutability since attachments are single-threaded.
pub trait StorageBackend {
    fn kind(&self) -> BackendKind;

    /// Store bytes at `key`, replacing anything already there.
    fn write(&self, key: &ObjectKey, content: &[u8]) -> Result<()>;

    /// Read bytes back. Returns Ok(None) if nothing is stored at `key`.
    fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>>;

    /// Delete the object at `key`. Deleting a missing object is not an error.
    fn delete(&self, key: &ObjectKey) -> Result<()>;

    fn exists(&self, key: &ObjectKey) -> Result<bool>;

    /// The storage path for `key`. A real path for the filesystem, the object
    /// key for remote stores.
    fn path(&self, key: &ObjectKey) -> PathBuf;

    /// Display URL for `key`.
    fn url(&self, key: &ObjectKey) -> String;

    /// Write a readable local copy of the object to `dest`.
    fn copy_to_local_file(&self, key: &ObjectKey, dest: &Path) -> Result<()> {
        let content = self
            .read(key)?
            .ok_or_else(|| TwinError::NotFound(key.clone()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &content)?;
        Ok(())
    }

    /// Stable public URL. Only object stores can hand these out.
    fn public_url(&self, _key: &ObjectKey) -> Result<String> {
        Err(TwinError::Unsupported {
            kind: self.kind(),
            operation: "public_url",
        })
    }

    /// Time-limited URL valid for `expires_in` from now.
    fn expiring_url(&self, _key: &ObjectKey, _expires_in: Duration) -> Result<String> {
        Err(TwinError::Unsupported {
            kind: self.kind(),
            operation: "expiring_url",
        })
    }
}

/// Unix timestamp `expires_in` from now, for expiring URLs.
pub(crate) fn expiry_timestamp(expires_in: Duration) -> Result<i64> {
    let secs = expires_in.as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc::now().timestamp().checked_add(secs))
        .ok_or(TwinError::ExpiryOutOfRange(secs))
}

/// Shared backends: the caller keeps one clone to inspect the store while an
/// attachment owns the other.
impl<B: StorageBackend + ?Sized> StorageBackend for Rc<B> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn write(&self, key: &ObjectKey, content: &[u8]) -> Result<()> {
        (**self).write(key, content)
    }

    fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>> {
        (**self).read(key)
    }

    fn delete(&self, key: &ObjectKey) -> Result<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool> {
        (**self).exists(key)
    }

    fn path(&self, key: &ObjectKey) -> PathBuf {
        (**self).path(key)
    }

    fn url(&self, key: &ObjectKey) -> String {
        (**self).url(key)
    }

    fn copy_to_local_file(&self, key: &ObjectKey, dest: &Path) -> Result<()> {
        (**self).copy_to_local_file(key, dest)
    }

    fn public_url(&self, key: &ObjectKey) -> Result<String> {
        (**self).public_url(key)
    }

    fn expiring_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
        (**self).expiring_url(key, expires_in)
    }
}

/// Builds the backend for one attachment. The primary is always requested as
/// [`BackendKind::Filesystem`]; the alternate uses the attachment's configured kind.
pub trait BackendFactory {
    fn build(&self, kind: BackendKind, attachment: &str) -> Result<Box<dyn StorageBackend>>;
}
