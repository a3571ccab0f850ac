//! # Configuration
//!
//! Storage configuration is managed by [`confique`], loaded from a TOML file with
//! environment overrides on top and compiled defaults underneath.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `filesystem.root` | `public/system` | Directory the filesystem backend writes under |
//! | `filesystem.url_prefix` | `/system` | URL prefix for locally served files |
//! | `remote.bucket` | none | Bucket name (`TWINSTORE_REMOTE_BUCKET`) |
//! | `remote.host` | `s3.amazonaws.com` | Host used in bucket URLs |
//! | `remote.scheme` | `https` | Scheme used in bucket URLs |
//!
//! ```toml
//! [filesystem]
//! root = "/var/app/public/system"
//!
//! [remote]
//! bucket = "app-uploads"
//! ```
//!
//! [`StandardFactory`] turns a config into backends for attachments.

use crate::backend::remote::DEFAULT_HOST;
use crate::backend::{
    BackendFactory, BackendKind, FsBackend, MemBackend, ObjectStoreBackend, StorageBackend,
};
use crate::error::{Result, TwinError};
use confique::Config;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    #[config(nested)]
    pub filesystem: FilesystemConfig,

    #[config(nested)]
    pub remote: RemoteConfig,
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FilesystemConfig {
    /// Directory the filesystem backend writes under.
    #[config(default = "public/system")]
    pub root: PathBuf,

    /// URL prefix for files served from `root`.
    #[config(default = "/system")]
    pub url_prefix: String,
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Bucket name. Required to build an object store backend.
    #[config(env = "TWINSTORE_REMOTE_BUCKET")]
    pub bucket: Option<String>,

    #[config(default = "s3.amazonaws.com")]
    pub host: String,

    #[config(default = "https")]
    pub scheme: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            filesystem: FilesystemConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("public/system"),
            url_prefix: "/system".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            host: DEFAULT_HOST.to_string(),
            scheme: "https".to_string(),
        }
    }
}

impl StorageConfig {
    /// Load from `path`, with environment variables taking precedence. A
    /// missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::builder().env().file(path.as_ref()).load()?)
    }
}

impl RemoteConfig {
    /// `{scheme}://{bucket}.{host}`, when a bucket is configured.
    pub fn endpoint(&self) -> Option<String> {
        self.bucket
            .as_ref()
            .map(|bucket| format!("{}://{}.{}", self.scheme, bucket, self.host))
    }
}

/// Builds backends from a [`StorageConfig`].
///
/// Every `Memory` request gets the same in-memory store, so attachments built
/// by one factory see each other's objects.
pub struct StandardFactory {
    config: StorageConfig,
    object_store: Option<Arc<dyn ObjectStore>>,
    memory: Rc<MemBackend>,
}

impl StandardFactory {
    pub fn new(config: StorageConfig) -> Self {
        let base_url = config
            .remote
            .endpoint()
            .unwrap_or_else(|| format!("{}://memory.{}", config.remote.scheme, config.remote.host));
        Self {
            memory: Rc::new(MemBackend::new(&base_url)),
            config,
            object_store: None,
        }
    }

    /// Store used for `ObjectStore` backends (S3, GCS, `InMemory` in tests).
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The shared in-memory store handed out for `Memory` backends.
    pub fn memory(&self) -> Rc<MemBackend> {
        self.memory.clone()
    }

    fn object_store_backend(&self, attachment: &str) -> Result<ObjectStoreBackend> {
        let store = self.object_store.clone().ok_or_else(|| {
            TwinError::Config(format!(
                "attachment `{attachment}` needs an object store but none is configured"
            ))
        })?;
        let bucket = self.config.remote.bucket.as_deref().ok_or_else(|| {
            TwinError::Config(format!(
                "attachment `{attachment}` needs remote.bucket to be set"
            ))
        })?;
        Ok(ObjectStoreBackend::new(store, bucket)
            .with_host(&self.config.remote.host)
            .with_scheme(&self.config.remote.scheme))
    }
}

impl BackendFactory for StandardFactory {
    fn build(&self, kind: BackendKind, attachment: &str) -> Result<Box<dyn StorageBackend>> {
        let backend: Box<dyn StorageBackend> = match kind {
            BackendKind::Filesystem => Box::new(FsBackend::new(
                self.config.filesystem.root.clone(),
                &self.config.filesystem.url_prefix,
            )),
            BackendKind::ObjectStore => Box::new(self.object_store_backend(attachment)?),
            BackendKind::Memory => Box::new(self.memory.clone()),
        };
        Ok(backend)
    }
}
