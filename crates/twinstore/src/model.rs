//! # Data Model
//!
//! Value types shared by backends, handles and attachments.
//!
//! - [`Style`]: a named rendition. `original` is implicit on every attachment.
//! - [`ObjectKey`]: where one style of one file lives. Both backends use the same
//!   relative path, so a key addresses the same bytes on either side.
//! - [`StoredFile`]: metadata of the file currently attached.
//! - [`PendingWrite`]: bytes staged for the next flush cycle.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ORIGINAL: &str = "original";

/// A named rendition of an attachment (`original`, `thumbnail`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Style(String);

impl Style {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn original() -> Self {
        Self(ORIGINAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_original(&self) -> bool {
        self.0 == ORIGINAL
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Style {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Resolved location of a single style of a stored file.
///
/// Ordering follows the fields, which keeps pending maps grouped by attachment
/// and record when they are iterated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub attachment: String,
    pub record_id: String,
    pub style: Style,
    pub file_name: String,
}

impl ObjectKey {
    pub fn new(
        attachment: impl Into<String>,
        record_id: impl Into<String>,
        style: Style,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            attachment: attachment.into(),
            record_id: record_id.into(),
            style,
            file_name: file_name.into(),
        }
    }

    /// `{attachment}/{record_id}/{style}/{file_name}`
    pub fn relative_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.attachment, self.record_id, self.style, self.file_name
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path())
    }
}

/// Metadata for the file currently held by an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub updated_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            size,
            updated_at: Utc::now(),
        }
    }
}

/// Bytes queued for one style, plus the staged source they were read from.
///
/// The staged path is a transient local file (an upload spool, a processor's
/// output). Only the handle that owns source teardown removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub content: Bytes,
    pub staged: Option<PathBuf>,
}

impl PendingWrite {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            staged: None,
        }
    }

    pub fn staged(content: impl Into<Bytes>, source: impl AsRef<Path>) -> Self {
        Self {
            content: content.into(),
            staged: Some(source.as_ref().to_path_buf()),
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Pending writes resolved to their object keys, as handed to a backend handle.
pub type PendingWrites = BTreeMap<ObjectKey, PendingWrite>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_layout() {
        let key = ObjectKey::new("avatars", "42", Style::new("thumbnail"), "me.png");
        assert_eq!(key.relative_path(), "avatars/42/thumbnail/me.png");
        assert_eq!(key.to_string(), "avatars/42/thumbnail/me.png");
    }

    #[test]
    fn test_original_style() {
        assert!(Style::original().is_original());
        assert!(!Style::from("thumbnail").is_original());
        assert_eq!(Style::original().as_str(), "original");
    }

    #[test]
    fn test_keys_order_by_style_within_record() {
        let a = ObjectKey::new("docs", "1", Style::new("original"), "a.pdf");
        let b = ObjectKey::new("docs", "1", Style::new("thumbnail"), "a.pdf");
        assert!(a < b);
    }

    #[test]
    fn test_pending_write_staged_source() {
        let write = PendingWrite::staged(&b"bytes"[..], "/tmp/upload-1");
        assert_eq!(write.len(), 5);
        assert_eq!(write.staged, Some(PathBuf::from("/tmp/upload-1")));
        assert!(PendingWrite::new(Vec::<u8>::new()).is_empty());
    }
}
