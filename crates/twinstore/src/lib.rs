//! # Twinstore Architecture
//!
//! Twinstore is a **write-through dual storage layer for file attachments**. It
//! keeps every file on local disk and, while a migration is under way, mirrors it
//! to a remote object store so that reads can move to the remote side without a
//! cut-over day.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Attachment (attachment/)                                   │
//! │  - Owns the file metadata and pending writes/deletes        │
//! │  - coordinator: flush ordering across handles               │
//! │  - router: which handle answers each read                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Policy (policy.rs)                                         │
//! │  - multiple_if / display_from_alternate predicates          │
//! │  - Re-evaluated on every call                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Handles (handle.rs)                                        │
//! │  - Primary (filesystem, owns staged sources)                │
//! │  - Secondary (alternate store, built only in dual mode)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Backends (backend/)                                        │
//! │  - StorageBackend trait                                     │
//! │  - FsBackend, ObjectStoreBackend, MemBackend (testing)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Migration Phases
//!
//! | `multiple_if` | `display_from_alternate` | Writes | Reads (`url`, `path`) |
//! |---------------|--------------------------|--------|-----------------------|
//! | false | any | filesystem | filesystem |
//! | true | false | alternate, then filesystem | filesystem |
//! | true | true | alternate, then filesystem | alternate |
//!
//! `exists` and `copy_to_local_file` always read the filesystem; `public_url` and
//! `expiring_url` always use the alternate store.
//!
//! ## Threading
//!
//! Attachments are single-threaded (`Rc`, `RefCell`). The object store backend
//! drives async calls on a private Tokio runtime and blocks on them, so it must
//! not be called from inside an async context.
//!
//! ## Testing Strategy
//!
//! Unit tests live next to the code and use [`MemBackend`] with injected
//! failures and a shared call journal to assert ordering. Integration tests in
//! `tests/` run whole scenarios against the filesystem and an in-memory
//! `object_store`.

pub mod attachment;
pub mod backend;
pub mod config;
pub mod error;
pub mod handle;
pub mod model;
pub mod policy;
mod runtime;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use attachment::{Attachment, AttachmentOptions, DeleteReport, Owner, Route, UrlOptions};
pub use backend::{
    BackendFactory, BackendKind, FsBackend, MemBackend, ObjectStoreBackend, StorageBackend,
};
pub use config::{StandardFactory, StorageConfig};
pub use error::{Result, TwinError};
pub use handle::{BackendHandle, Role};
pub use model::{ObjectKey, PendingWrite, StoredFile, Style};
pub use policy::{MigrationFlags, StoragePolicy};
