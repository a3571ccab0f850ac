use super::{BackendKind, StorageBackend};
use crate::error::{Result, TwinError};
use crate::model::ObjectKey;
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Local disk storage rooted at one directory, served under a URL prefix.
///
/// Layout: `{root}/{attachment}/{record_id}/{style}/{file_name}`, with display
/// URLs `{url_prefix}/{attachment}/{record_id}/{style}/{file_name}`.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
    url_prefix: String,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    fn full_path(&self, key: &ObjectKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(TwinError::Io)?;
        }
        Ok(())
    }

    /// Remove directories left empty by a delete, stopping at the root.
    fn prune_empty_dirs(&self, from: &Path) {
        let mut dir = from.to_path_buf();
        while dir != self.root && dir.starts_with(&self.root) {
            // Fails on non-empty directories, which is where we stop.
            if fs::remove_dir(&dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
    }
}

impl StorageBackend for FsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn write(&self, key: &ObjectKey, content: &[u8]) -> Result<()> {
        let target_path = self.full_path(key);
        let dir = target_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_dir(&dir)?;

        // Atomic Write
        let tmp_path = dir.join(format!(".data-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_path, content).map_err(TwinError::Io)?;
        fs::rename(&tmp_path, &target_path).map_err(TwinError::Io)?;

        debug!(path = %target_path.display(), size = content.len(), "filesystem: wrote object");
        Ok(())
    }

    fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>> {
        let path = self.full_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read(path).map_err(TwinError::Io)?;
        Ok(Some(Bytes::from(content)))
    }

    fn delete(&self, key: &ObjectKey) -> Result<()> {
        let path = self.full_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(TwinError::Io)?;
            debug!(path = %path.display(), "filesystem: deleted object");
        }
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent);
        }
        Ok(())
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool> {
        Ok(self.full_path(key).is_file())
    }

    fn path(&self, key: &ObjectKey) -> PathBuf {
        self.full_path(key)
    }

    fn url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.url_prefix, key.relative_path())
    }

    fn copy_to_local_file(&self, key: &ObjectKey, dest: &Path) -> Result<()> {
        let source = self.full_path(key);
        if !source.is_file() {
            return Err(TwinError::NotFound(key.clone()));
        }
        if let Some(parent) = dest.parent() {
            self.ensure_dir(parent)?;
        }
        fs::copy(&source, dest).map_err(TwinError::Io)?;
        Ok(())
    }
}
