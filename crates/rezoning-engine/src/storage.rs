//! Object storage access (S3/MinIO or a local directory).

use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, path::Path, ObjectStore};
use std::sync::Arc;
use tracing::{debug, instrument};

use rezoning_common::{LcoeError, LcoeResult};

use crate::config::StorageConfig;

/// Read access to the bucket or directory holding datasets and countries.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    location: String,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("location", &self.location)
            .finish()
    }
}

impl ObjectStorage {
    /// Create a storage client from config.
    pub fn new(config: &StorageConfig) -> LcoeResult<Self> {
        match config.bucket() {
            Some(bucket) => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_region(&config.region);

                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(key) = &config.access_key_id {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = &config.secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if config.allow_http {
                    builder = builder.with_allow_http(true);
                }

                let store = builder.build().map_err(|e| {
                    LcoeError::Storage(format!("Failed to create S3 client: {}", e))
                })?;

                Ok(Self {
                    store: Arc::new(store),
                    location: config.data_url.clone(),
                })
            }
            None => Self::local(&config.data_url),
        }
    }

    /// Storage rooted at a local directory.
    pub fn local(root: &str) -> LcoeResult<Self> {
        let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
            LcoeError::Storage(format!("Failed to open data directory {}: {}", root, e))
        })?;
        Ok(Self {
            store: Arc::new(store),
            location: root.to_string(),
        })
    }

    /// Wrap an existing store (in-memory stores in tests).
    pub fn from_store(store: Arc<dyn ObjectStore>, location: impl Into<String>) -> Self {
        Self {
            store,
            location: location.into(),
        }
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(location = %self.location))]
    pub async fn get(&self, path: &str) -> LcoeResult<Bytes> {
        self.get_opt(path)
            .await?
            .ok_or_else(|| LcoeError::Storage(format!("Object not found: {}", path)))
    }

    /// Read bytes from a path, returning `None` when the object does not exist.
    pub async fn get_opt(&self, path: &str) -> LcoeResult<Option<Bytes>> {
        let location = Path::from(path);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(LcoeError::Storage(format!(
                    "Failed to read {}: {}",
                    path, e
                )))
            }
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| LcoeError::Storage(format!("Failed to read bytes: {}", e)))?;

        debug!(path = %path, size = bytes.len(), "Read object");
        Ok(Some(bytes))
    }

    /// Write bytes to a path.
    pub async fn put(&self, path: &str, data: Bytes) -> LcoeResult<()> {
        let location = Path::from(path);
        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| LcoeError::Storage(format!("Failed to write {}: {}", path, e)))?;
        Ok(())
    }

    /// Check if an object exists.
    pub async fn exists(&self, path: &str) -> LcoeResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(LcoeError::Storage(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// Readiness probe: list one entry under `prefix`.
    pub async fn ping(&self, prefix: &str) -> LcoeResult<()> {
        use futures::StreamExt;

        let prefix_path = Path::from(prefix);
        let mut stream = self.store.list(Some(&prefix_path));
        match stream.next().await {
            None | Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(LcoeError::Storage(format!(
                "Failed to list {}: {}",
                prefix, e
            ))),
        }
    }
}
