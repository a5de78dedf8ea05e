//! Remote upload of rendered documents.

mod config;
mod drive;
mod local;

pub use config::{DriveConfig, LocalUploadConfig, UploadBackend, UploadConfig};
pub use drive::{classify_drive_status, drive_view_link, DriveUploader};
pub use local::LocalUploader;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::render::RenderedDocument;
use crate::stage::{Reporter, StageOutcome};

/// Caller credentials passed through to the upload destination.
///
/// The pipeline treats these as opaque; it never validates them.
#[derive(Clone, Default)]
pub struct AuthContext {
    pub bearer_token: Option<String>,
    pub user_id: Option<String>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Where an uploaded document ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub remote_id: String,
    pub link: String,
}

/// A document found at the upload destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub remote_id: String,
    pub name: String,
    pub link: String,
    pub modified_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentUploader: Send + Sync {
    fn name(&self) -> &str;

    /// Uploads `doc` under `destination`. Missing credentials surface as
    /// `AuthRequired` and are never retried here.
    async fn upload(
        &self,
        doc: &RenderedDocument,
        destination: &str,
        auth: &AuthContext,
        reporter: &Reporter,
    ) -> StageOutcome<UploadReceipt>;

    /// Documents whose name starts with `prefix` and that were modified at
    /// or after `since`, newest first.
    async fn list_recent(
        &self,
        prefix: &str,
        since: DateTime<Utc>,
        auth: &AuthContext,
    ) -> StageOutcome<Vec<RemoteDocument>>;
}

/// Builds the uploader for the configured backend.
pub fn create_uploader(config: &UploadConfig) -> StageOutcome<Arc<dyn DocumentUploader>> {
    match config.backend {
        UploadBackend::Local => {
            let mut uploader = LocalUploader::new(config.local.dir.clone(), config.max_bytes);
            if let Some(base) = &config.local.base_url {
                uploader = uploader.with_base_url(base.clone());
            }
            Ok(Arc::new(uploader))
        }
        UploadBackend::Drive => Ok(Arc::new(DriveUploader::new(
            config.drive.clone(),
            config.max_bytes,
        )?)),
    }
}

/// Reduces a destination name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Brief_notes_ab12.md"), "Brief_notes_ab12.md");
        assert_eq!(sanitize_file_name("my report.md"), "my_report.md");
        assert_eq!(sanitize_file_name("../x"), "_x");
        assert_eq!(sanitize_file_name("..."), "document");
    }

    #[test]
    fn test_auth_context_debug_redacts_token() {
        let auth = AuthContext {
            bearer_token: Some("secret".to_string()),
            user_id: Some("u1".to_string()),
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("u1"));
    }

    #[test]
    fn test_create_uploader_by_backend() {
        let config = UploadConfig::default();
        assert_eq!(create_uploader(&config).unwrap().name(), "local");

        let config = UploadConfig {
            backend: UploadBackend::Drive,
            ..UploadConfig::default()
        };
        assert_eq!(create_uploader(&config).unwrap().name(), "drive");
    }
}
