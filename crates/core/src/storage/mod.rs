//! Temporary object staging for services that read input by reference.

use async_trait::async_trait;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;
use crate::stage::{ErrorKind, StageError, StageOutcome};

const PART_SIZE: usize = 5 * 1024 * 1024;

/// Stages local files in an object store.
#[async_trait]
pub trait ObjectStager: Send + Sync {
    /// Copies `path` into the store and returns its URI.
    async fn upload(&self, path: &Path) -> StageOutcome<String>;

    /// Deletes a previously staged object. Deleting a missing object succeeds.
    async fn delete(&self, uri: &str) -> StageOutcome<()>;
}

/// Object store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingBackend {
    #[default]
    Local,
    Gcs,
}

/// Staging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default)]
    pub backend: StagingBackend,
    /// Root directory for the local backend.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    /// Bucket for the GCS backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Service account key file for the GCS backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<String>,
    /// Key prefix for staged objects.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            backend: StagingBackend::default(),
            local_dir: default_local_dir(),
            bucket: None,
            service_account_path: None,
            prefix: default_prefix(),
        }
    }
}

fn default_local_dir() -> PathBuf {
    std::env::temp_dir().join("briefsmith-staging")
}

fn default_prefix() -> String {
    "staging".to_string()
}

/// Aborts a multipart upload, logging when the store refuses.
async fn abort_upload(upload: &mut dyn MultipartUpload, key: &str) {
    if let Err(e) = upload.abort().await {
        metrics::CLEANUP_FAILURES
            .with_label_values(&["staged_object"])
            .inc();
        warn!(key, error = %e, "Failed to abort multipart upload");
    }
}

fn store_error(operation: &str, e: object_store::Error) -> StageError {
    StageError::new(
        ErrorKind::ConnectionError,
        format!("staging {} failed: {}", operation, e),
    )
}

/// [`ObjectStager`] over any `object_store` backend.
pub struct ObjectStoreStager {
    store: Arc<dyn ObjectStore>,
    /// URI prefix for keys, e.g. `gs://bucket`.
    root: String,
    prefix: String,
}

impl ObjectStoreStager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        root: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            root: root.into().trim_end_matches('/').to_string(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StagingConfig) -> StageOutcome<Self> {
        match config.backend {
            StagingBackend::Local => {
                std::fs::create_dir_all(&config.local_dir).map_err(|e| {
                    StageError::fatal(
                        ErrorKind::ServiceUnavailable,
                        format!("cannot create staging dir: {}", e),
                    )
                })?;
                let fs = LocalFileSystem::new_with_prefix(&config.local_dir).map_err(|e| {
                    StageError::fatal(
                        ErrorKind::ServiceUnavailable,
                        format!("local staging: {}", e),
                    )
                })?;
                let root = format!("file://{}", config.local_dir.display());
                Ok(Self::new(Arc::new(fs), root, &config.prefix))
            }
            StagingBackend::Gcs => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    StageError::fatal(ErrorKind::ServiceUnavailable, "gcs staging needs a bucket")
                })?;
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
                if let Some(path) = &config.service_account_path {
                    builder = builder.with_service_account_path(path);
                }
                let store = builder.build().map_err(|e| {
                    StageError::fatal(ErrorKind::ServiceUnavailable, format!("gcs staging: {}", e))
                })?;
                Ok(Self::new(Arc::new(store), format!("gs://{}", bucket), &config.prefix))
            }
        }
    }

    fn key_for(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        if self.prefix.is_empty() {
            format!("{}-{}", Uuid::new_v4().simple(), name)
        } else {
            format!("{}/{}-{}", self.prefix, Uuid::new_v4().simple(), name)
        }
    }

    fn key_of<'a>(&self, uri: &'a str) -> StageOutcome<&'a str> {
        uri.strip_prefix(&self.root)
            .map(|k| k.trim_start_matches('/'))
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StageError::fatal(
                    ErrorKind::InvalidInput,
                    format!("{} is not a staged object", uri),
                )
            })
    }
}

#[async_trait]
impl ObjectStager for ObjectStoreStager {
    async fn upload(&self, path: &Path) -> StageOutcome<String> {
        let started = Instant::now();
        let key = self.key_for(path);
        let location = StorePath::from(key.as_str());

        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            StageError::fatal(
                ErrorKind::Internal,
                format!("cannot open {}: {}", path.display(), e),
            )
        })?;
        let mut upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| store_error("upload", e))?;

        let mut total: u64 = 0;
        loop {
            let mut part = vec![0u8; PART_SIZE];
            let mut filled = 0;
            while filled < PART_SIZE {
                let n = match file.read(&mut part[filled..]).await {
                    Ok(n) => n,
                    Err(e) => {
                        abort_upload(upload.as_mut(), &key).await;
                        return Err(StageError::fatal(
                            ErrorKind::Internal,
                            format!("failed reading {}: {}", path.display(), e),
                        ));
                    }
                };
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            part.truncate(filled);
            total += filled as u64;
            if let Err(e) = upload.put_part(PutPayload::from(part)).await {
                abort_upload(upload.as_mut(), &key).await;
                let elapsed = started.elapsed().as_secs_f64();
                metrics::record_external_call("staging", "upload", elapsed, false);
                return Err(store_error("upload", e));
            }
            if filled < PART_SIZE {
                break;
            }
        }

        let completed = upload.complete().await;
        metrics::record_external_call(
            "staging",
            "upload",
            started.elapsed().as_secs_f64(),
            completed.is_ok(),
        );
        completed.map_err(|e| store_error("upload", e))?;

        let uri = format!("{}/{}", self.root, key);
        debug!(uri = %uri, bytes = total, "Staged object");
        Ok(uri)
    }

    async fn delete(&self, uri: &str) -> StageOutcome<()> {
        let key = self.key_of(uri)?;
        match self.store.delete(&StorePath::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                debug!(uri = %uri, "Deleted staged object");
                Ok(())
            }
            Err(e) => Err(store_error("delete", e)),
        }
    }
}
