//! Object store backend: any [`ObjectStore`] (S3, GCS, Azure, in-memory) behind the
//! synchronous [`StorageBackend`] interface.
//!
//! Calls block the current thread on a shared Tokio runtime, so this backend
//! must not be used from inside an async context.

use super::{expiry_timestamp, BackendKind, StorageBackend};
use crate::error::Result;
use crate::model::ObjectKey;
use crate::runtime::block_on;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_HOST: &str = "s3.amazonaws.com";

/// Remote bucket storage. URLs follow the virtual-hosted bucket convention:
/// `{scheme}://{bucket}.{host}/{key}`.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    host: String,
    scheme: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            host: DEFAULT_HOST.to_string(),
            scheme: "https".to_string(),
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Number of objects stored under `prefix` (or in the whole bucket).
    pub fn object_count(&self, prefix: Option<&str>) -> Result<usize> {
        let prefix = prefix.map(ObjectPath::from);
        let store = self.store.clone();
        let objects = block_on(async move {
            store
                .list(prefix.as_ref())
                .try_collect::<Vec<ObjectMeta>>()
                .await
        })??;
        Ok(objects.len())
    }

    fn location(key: &ObjectKey) -> ObjectPath {
        ObjectPath::from(key.relative_path())
    }

    fn endpoint(&self) -> String {
        format!("{}://{}.{}", self.scheme, self.bucket, self.host)
    }
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.store.to_string())
            .field("bucket", &self.bucket)
            .field("host", &self.host)
            .finish()
    }
}

impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    fn write(&self, key: &ObjectKey, content: &[u8]) -> Result<()> {
        let location = Self::location(key);
        let payload = PutPayload::from(Bytes::copy_from_slice(content));
        block_on(self.store.put(&location, payload))??;
        debug!(bucket = %self.bucket, key = %location, size = content.len(), "object_store: put object");
        Ok(())
    }

    fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>> {
        let location = Self::location(key);
        let store = self.store.clone();
        let content = block_on(async move {
            match store.get(&location).await {
                Ok(result) => result.bytes().await.map(Some),
                Err(object_store::Error::NotFound { .. }) => Ok(None),
                Err(err) => Err(err),
            }
        })??;
        Ok(content)
    }

    fn delete(&self, key: &ObjectKey) -> Result<()> {
        let location = Self::location(key);
        match block_on(self.store.delete(&location))? {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                debug!(bucket = %self.bucket, key = %location, "object_store: deleted object");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool> {
        let location = Self::location(key);
        match block_on(self.store.head(&location))? {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn path(&self, key: &ObjectKey) -> PathBuf {
        PathBuf::from(key.relative_path())
    }

    fn url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.endpoint(), key.relative_path())
    }

    fn public_url(&self, key: &ObjectKey) -> Result<String> {
        Ok(self.url(key))
    }

    /// Unsigned: the expiry is carried as `X-Expires` for the serving gateway to
    /// enforce.
    fn expiring_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String> {
        let expires = expiry_timestamp(expires_in)?;
        Ok(format!("{}?X-Expires={}", self.url(key), expires))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TwinError;
    use crate::model::Style;
    use chrono::Utc;
    use object_store::memory::InMemory;

    fn backend() -> ObjectStoreBackend {
        ObjectStoreBackend::new(Arc::new(InMemory::new()), "attachments")
    }

    fn key(style: &str) -> ObjectKey {
        ObjectKey::new("avatars", "12", Style::new(style), "cat.jpg")
    }

    #[test]
    fn test_put_exists_delete() {
        let backend = backend();
        let key = key("original");

        assert!(!backend.exists(&key).unwrap());
        backend.write(&key, b"meow").unwrap();
        assert!(backend.exists(&key).unwrap());
        assert_eq!(backend.read(&key).unwrap().unwrap(), Bytes::from_static(b"meow"));
        assert_eq!(backend.object_count(None).unwrap(), 1);

        backend.delete(&key).unwrap();
        assert!(!backend.exists(&key).unwrap());
        assert_eq!(backend.read(&key).unwrap(), None);
        assert_eq!(backend.object_count(None).unwrap(), 0);
    }

    #[test]
    fn test_object_count_by_prefix() {
        let backend = backend();
        backend.write(&key("original"), b"a").unwrap();
        backend.write(&key("thumbnail"), b"b").unwrap();
        backend
            .write(
                &ObjectKey::new("docs", "1", Style::original(), "x.pdf"),
                b"c",
            )
            .unwrap();

        assert_eq!(backend.object_count(Some("avatars")).unwrap(), 2);
        assert_eq!(backend.object_count(None).unwrap(), 3);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        assert!(backend().delete(&key("original")).is_ok());
    }

    #[test]
    fn test_bucket_urls() {
        let backend = backend();
        let key = key("original");
        assert_eq!(
            backend.url(&key),
            "https://attachments.s3.amazonaws.com/avatars/12/original/cat.jpg"
        );
        assert_eq!(backend.path(&key), PathBuf::from("avatars/12/original/cat.jpg"));

        let custom = ObjectStoreBackend::new(Arc::new(InMemory::new()), "media")
            .with_host("storage.example.net/")
            .with_scheme("http");
        assert_eq!(
            custom.public_url(&key).unwrap(),
            "http://media.storage.example.net/avatars/12/original/cat.jpg"
        );
    }

    #[test]
    fn test_expiring_url_carries_expiry() {
        let backend = backend();
        let before = Utc::now().timestamp();
        let url = backend
            .expiring_url(&key("original"), Duration::from_secs(600))
            .unwrap();
        let (base, query) = url.split_once("?X-Expires=").unwrap();
        assert_eq!(base, backend.url(&key("original")));
        let expires: i64 = query.parse().unwrap();
        assert!(expires >= before + 600);
    }

    #[test]
    fn test_expiring_url_out_of_range() {
        let backend = backend();
        for secs in [u64::MAX, i64::MAX as u64] {
            let err = backend
                .expiring_url(&key("original"), Duration::from_secs(secs))
                .unwrap_err();
            assert!(matches!(err, TwinError::ExpiryOutOfRange(s) if s == secs));
        }
    }
}
