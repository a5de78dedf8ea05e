//! Mock document uploader.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::render::RenderedDocument;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome};
use crate::upload::{AuthContext, DocumentUploader, RemoteDocument, UploadReceipt};

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub destination: String,
    pub bytes: Bytes,
    pub bearer_token: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Mock implementation of [`DocumentUploader`].
#[derive(Debug, Default)]
pub struct MockUploader {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    next_error: Arc<RwLock<Option<StageError>>>,
    require_auth: Arc<RwLock<bool>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }

    /// Fail with `AuthRequired` when the caller sends no bearer token.
    pub async fn require_auth(&self, required: bool) {
        *self.require_auth.write().await = required;
    }
}

#[async_trait]
impl DocumentUploader for MockUploader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(
        &self,
        doc: &RenderedDocument,
        destination: &str,
        auth: &AuthContext,
        reporter: &Reporter,
    ) -> StageOutcome<UploadReceipt> {
        reporter.report(0, format!("Uploading {}", destination)).await;
        if *self.require_auth.read().await && auth.bearer_token.is_none() {
            return Err(StageError::new(
                ErrorKind::AuthRequired,
                "upload requires an authorization token",
            ));
        }
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let mut uploads = self.uploads.write().await;
        uploads.push(RecordedUpload {
            destination: destination.to_string(),
            bytes: doc.bytes.clone(),
            bearer_token: auth.bearer_token.clone(),
            uploaded_at: Utc::now(),
        });
        let remote_id = format!("mock-file-{}", uploads.len());
        reporter.report(100, "Upload complete").await;
        Ok(UploadReceipt {
            link: format!("mock://uploads/{}", remote_id),
            remote_id,
        })
    }

    async fn list_recent(
        &self,
        prefix: &str,
        since: DateTime<Utc>,
        auth: &AuthContext,
    ) -> StageOutcome<Vec<RemoteDocument>> {
        if *self.require_auth.read().await && auth.bearer_token.is_none() {
            return Err(StageError::new(
                ErrorKind::AuthRequired,
                "listing documents requires an authorization token",
            ));
        }
        let uploads = self.uploads.read().await;
        let mut documents: Vec<_> = uploads
            .iter()
            .enumerate()
            .filter(|(_, u)| u.destination.starts_with(prefix) && u.uploaded_at >= since)
            .map(|(i, u)| {
                let remote_id = format!("mock-file-{}", i + 1);
                RemoteDocument {
                    link: format!("mock://uploads/{}", remote_id),
                    remote_id,
                    name: u.destination.clone(),
                    modified_at: u.uploaded_at,
                }
            })
            .collect();
        documents.reverse();
        Ok(documents)
    }
}
