//! # Attachments
//!
//! An [`Attachment`] is one file bound to one field of an owning record, stored
//! as an `original` plus any named styles. It always writes to the filesystem
//! handle and, while dual mode is on, mirrors every write and delete to an
//! alternate handle.
//!
//! ## Two-Phase Policy
//!
//! - **Construction**: `multiple_if` is evaluated once. If it holds, the alternate
//!   handle is built; otherwise the attachment is filesystem-only for its whole
//!   life, whatever the flag does later.
//! - **Every call**: `multiple_if` and `display_from_alternate` are evaluated
//!   again to route reads and decide whether writes fan out.
//!
//! ## Lifecycle
//!
//! ```text
//! assign ──► pending writes ──save()──► flush_deletes ─► flush_writes
//! clear  ──► pending deletes ─save()──►      (secondary first, primary last)
//! destroy ─► queue_all_for_delete ─► flush_deletes
//!                                     (primary first and fatal,
//!                                      secondary last and logged)
//! ```
//!
//! See [`coordinator`] for the flush ordering and [`router`] for read selection.

use crate::backend::{BackendFactory, BackendKind};
use crate::error::{Result, TwinError};
use crate::handle::BackendHandle;
use crate::model::{ObjectKey, PendingWrite, StoredFile, Style};
use crate::policy::StoragePolicy;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use tracing::debug;

pub mod coordinator;
pub mod router;

pub use coordinator::DeleteReport;
pub use router::{Route, UrlOptions};

/// A record that can own attachments.
pub trait Owner {
    /// Stable identifier used in storage keys.
    fn owner_id(&self) -> String;
}

/// Definition-time options for an attachment field.
pub struct AttachmentOptions<R> {
    pub styles: Vec<Style>,
    pub policy: StoragePolicy<R>,
    pub alternate_storage: Option<BackendKind>,
    /// URL served while no file is attached; `:style` is replaced.
    pub default_url: Option<String>,
}

impl<R> AttachmentOptions<R> {
    pub fn new() -> Self {
        Self {
            styles: Vec::new(),
            policy: StoragePolicy::new(),
            alternate_storage: None,
            default_url: None,
        }
    }

    pub fn style(mut self, name: &str) -> Self {
        let style = Style::new(name);
        if !style.is_original() && !self.styles.contains(&style) {
            self.styles.push(style);
        }
        self
    }

    pub fn policy(mut self, policy: StoragePolicy<R>) -> Self {
        self.policy = policy;
        self
    }

    pub fn alternate_storage(mut self, kind: BackendKind) -> Self {
        self.alternate_storage = Some(kind);
        self
    }

    pub fn default_url(mut self, url: &str) -> Self {
        self.default_url = Some(url.to_string());
        self
    }
}

impl<R> Default for AttachmentOptions<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for AttachmentOptions<R> {
    fn clone(&self) -> Self {
        Self {
            styles: self.styles.clone(),
            policy: self.policy.clone(),
            alternate_storage: self.alternate_storage,
            default_url: self.default_url.clone(),
        }
    }
}

pub struct Attachment<R> {
    name: String,
    record: Weak<R>,
    record_id: String,
    styles: Vec<Style>,
    default_url: String,
    policy: StoragePolicy<R>,
    file: Option<StoredFile>,
    pending_writes: BTreeMap<Style, PendingWrite>,
    pending_deletes: Vec<ObjectKey>,
    primary: BackendHandle,
    secondary: Option<BackendHandle>,
}

impl<R: Owner> Attachment<R> {
    /// Build the attachment and its handles for `record`.
    ///
    /// The filesystem handle is always built. The alternate handle is built only
    /// if `multiple_if` holds right now.
    pub fn new(
        name: &str,
        record: &Rc<R>,
        options: AttachmentOptions<R>,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let primary = BackendHandle::primary(factory.build(BackendKind::Filesystem, name)?);

        let secondary = if options.policy.use_multiple(record) {
            let kind = options.alternate_storage.ok_or_else(|| {
                TwinError::Config(format!(
                    "attachment `{name}` enables multiple storage without alternate_storage"
                ))
            })?;
            Some(BackendHandle::secondary(factory.build(kind, name)?))
        } else {
            None
        };

        let mut styles = vec![Style::original()];
        styles.extend(options.styles);

        let default_url = options
            .default_url
            .unwrap_or_else(|| format!("/{name}/:style/missing.png"));

        debug!(
            attachment = name,
            record = %record.owner_id(),
            alternate = ?secondary.as_ref().map(BackendHandle::kind),
            "attachment built"
        );

        Ok(Self {
            name: name.to_string(),
            record: Rc::downgrade(record),
            record_id: record.owner_id(),
            styles,
            default_url,
            policy: options.policy,
            file: None,
            pending_writes: BTreeMap::new(),
            pending_deletes: Vec::new(),
            primary,
            secondary,
        })
    }

    /// Attach metadata for a file that is already stored (a loaded record).
    pub fn with_file(mut self, file: StoredFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// The owning record, if it is still alive.
    pub fn record(&self) -> Option<Rc<R>> {
        self.record.upgrade()
    }

    /// `original` first, then named styles in definition order.
    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    pub fn file(&self) -> Option<&StoredFile> {
        self.file.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.file.is_some()
    }

    pub fn filesystem(&self) -> &BackendHandle {
        &self.primary
    }

    /// `None` when dual mode was off at construction.
    pub fn alt_storage(&self) -> Option<&BackendHandle> {
        self.secondary.as_ref()
    }

    pub fn pending_writes(&self) -> &BTreeMap<Style, PendingWrite> {
        &self.pending_writes
    }

    pub fn pending_deletes(&self) -> &[ObjectKey] {
        &self.pending_deletes
    }

    // --- Policy ---

    /// `multiple_if` for the record as it is now. A dropped record is never dual.
    pub fn use_multiple(&self) -> bool {
        self.record
            .upgrade()
            .is_some_and(|record| self.policy.use_multiple(&record))
    }

    /// Whether reads should prefer the alternate store right now.
    pub fn display_from_alternate(&self) -> bool {
        self.record
            .upgrade()
            .is_some_and(|record| self.policy.display_from_alternate(&record))
    }

    /// Dual mode is on and there is an alternate handle to mirror to.
    fn mirroring(&self) -> bool {
        self.secondary.is_some() && self.use_multiple()
    }

    // --- Assignment ---

    /// Stage a new file. `file_name` must be a single path component,
    /// `renditions` must contain `original`, and every style must be one this
    /// attachment defines. Any file already attached is queued for deletion
    /// first.
    pub fn assign<I>(
        &mut self,
        file_name: &str,
        content_type: Option<&str>,
        renditions: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (Style, PendingWrite)>,
    {
        check_file_name(file_name)?;
        let renditions: BTreeMap<Style, PendingWrite> = renditions.into_iter().collect();
        for style in renditions.keys() {
            self.check_style(style)?;
        }
        let original = renditions
            .get(&Style::original())
            .ok_or_else(|| TwinError::MissingOriginal(self.name.clone()))?;
        let size = original.len() as u64;

        self.queue_all_for_delete();
        self.pending_writes = renditions;
        self.file = Some(StoredFile::new(
            file_name,
            content_type.map(str::to_string),
            size,
        ));
        debug!(attachment = %self.name, record = %self.record_id, file = file_name, "file assigned");
        Ok(())
    }

    /// Detach the current file; its objects are removed on the next save.
    pub fn clear(&mut self) {
        self.queue_all_for_delete();
    }

    // --- Keys ---

    fn check_style(&self, style: &Style) -> Result<()> {
        if self.styles.contains(style) {
            Ok(())
        } else {
            Err(TwinError::UnknownStyle {
                attachment: self.name.clone(),
                style: style.to_string(),
            })
        }
    }

    fn key_in(&self, file: &StoredFile, style: &Style) -> ObjectKey {
        ObjectKey::new(&self.name, &self.record_id, style.clone(), &file.file_name)
    }

    /// Key of `style` for the current file.
    pub fn key_for(&self, style: &Style) -> Result<ObjectKey> {
        self.check_style(style)?;
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| TwinError::NoFile(self.name.clone()))?;
        Ok(self.key_in(file, style))
    }

    fn keys_in(&self, file: &StoredFile) -> Vec<ObjectKey> {
        self.styles
            .iter()
            .map(|style| self.key_in(file, style))
            .collect()
    }
}

/// Keys embed the file name as one path segment on every backend.
fn check_file_name(file_name: &str) -> Result<()> {
    let invalid = file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\', '\0']);
    if invalid {
        Err(TwinError::InvalidFileName(file_name.to_string()))
    } else {
        Ok(())
    }
}

impl<R> std::fmt::Debug for Attachment<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("record_id", &self.record_id)
            .field("styles", &self.styles)
            .field("file", &self.file)
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{renditions, Doc, TestEnv};

    #[test]
    fn test_dual_mode_off_builds_no_secondary() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = env.attachment(&doc);

        assert!(attachment.alt_storage().is_none());
        assert_eq!(attachment.filesystem().kind(), BackendKind::Filesystem);
        assert!(!attachment.use_multiple());
    }

    #[test]
    fn test_dual_mode_on_builds_secondary() {
        let env = TestEnv::new(true, false);
        let doc = Doc::new(1);
        let attachment = env.attachment(&doc);

        let alt = attachment.alt_storage().unwrap();
        assert_eq!(alt.kind(), BackendKind::Memory);
        assert!(!alt.owns_source_teardown());
        assert!(attachment.filesystem().owns_source_teardown());
    }

    #[test]
    fn test_flag_flip_after_build_never_creates_secondary() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = env.attachment(&doc);

        env.flags.set_dual_write(true);
        assert!(attachment.use_multiple());
        assert!(attachment.alt_storage().is_none());
    }

    #[test]
    fn test_missing_alternate_storage_is_config_error() {
        let env = TestEnv::new(true, false);
        let doc = Doc::new(1);
        let options = AttachmentOptions::new().policy(StoragePolicy::from_flags(env.flags.clone()));
        let err = Attachment::new("avatar", &doc, options, &env.factory).unwrap_err();
        assert!(matches!(err, TwinError::Config(_)));
    }

    #[test]
    fn test_styles_start_with_original() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = env.attachment(&doc);
        let names: Vec<&str> = attachment.styles().iter().map(Style::as_str).collect();
        assert_eq!(names, vec!["original", "thumbnail"]);
    }

    #[test]
    fn test_assign_requires_original() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let mut attachment = env.attachment(&doc);
        let err = attachment
            .assign(
                "a.png",
                None,
                vec![(Style::new("thumbnail"), PendingWrite::new(&b"t"[..]))],
            )
            .unwrap_err();
        assert!(matches!(err, TwinError::MissingOriginal(_)));
        assert!(!attachment.is_present());
    }

    #[test]
    fn test_assign_rejects_unknown_style() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let mut attachment = env.attachment(&doc);
        let mut files = renditions(b"img");
        files.push((Style::new("poster"), PendingWrite::new(&b"p"[..])));
        let err = attachment.assign("a.png", None, files).unwrap_err();
        assert!(matches!(err, TwinError::UnknownStyle { .. }));
    }

    #[test]
    fn test_assign_records_file_metadata() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let mut attachment = env.attachment(&doc);
        attachment
            .assign("a.png", Some("image/png"), renditions(b"12345"))
            .unwrap();

        let file = attachment.file().unwrap();
        assert_eq!(file.file_name, "a.png");
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert_eq!(file.size, 5);
        assert_eq!(attachment.pending_writes().len(), 2);
    }

    #[test]
    fn test_reassign_queues_old_keys() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let mut attachment = env.attachment(&doc);
        attachment.assign("old.png", None, renditions(b"1")).unwrap();
        attachment.save().unwrap();

        attachment.assign("new.png", None, renditions(b"2")).unwrap();
        let queued: Vec<&str> = attachment
            .pending_deletes()
            .iter()
            .map(|k| k.file_name.as_str())
            .collect();
        assert_eq!(queued, vec!["old.png", "old.png"]);
    }

    #[test]
    fn test_assign_rejects_path_like_names() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let mut attachment = env.attachment(&doc);
        for name in ["", ".", "..", "photos/b.png", "..\\b.png", "../b.png"] {
            let err = attachment.assign(name, None, renditions(b"img")).unwrap_err();
            assert!(matches!(err, TwinError::InvalidFileName(_)), "{name:?}");
        }
        assert!(!attachment.is_present());
    }

    #[test]
    fn test_reassign_with_slash_keeps_stored_file() {
        let env = TestEnv::new(true, false);
        let doc = Doc::new(1);
        let mut attachment = env.attachment(&doc);
        attachment.assign("a.png", None, renditions(b"img")).unwrap();
        attachment.save().unwrap();

        let err = attachment
            .assign("photos/b.png", None, renditions(b"new"))
            .unwrap_err();
        assert!(matches!(err, TwinError::InvalidFileName(_)));
        assert!(attachment.pending_deletes().is_empty());

        attachment.save().unwrap();
        assert_eq!(attachment.file().unwrap().file_name, "a.png");
        assert!(attachment.exists(&Style::original()).unwrap());
        assert_eq!(env.local_files().len(), 2);
        assert_eq!(env.remote.object_count(), 2);
    }

    #[test]
    fn test_dropped_record_disables_policy() {
        let env = TestEnv::new(true, true);
        let doc = Doc::new(1);
        let attachment = env.attachment(&doc);
        drop(doc);

        assert!(attachment.record().is_none());
        assert!(!attachment.use_multiple());
        assert!(!attachment.display_from_alternate());
    }
}
