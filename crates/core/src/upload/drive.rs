//! Google Drive uploads.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::DriveConfig;
use super::{AuthContext, DocumentUploader, RemoteDocument, UploadReceipt};
use crate::metrics;
use crate::render::RenderedDocument;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome};

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveListedFile {
    id: String,
    name: String,
    modified_time: DateTime<Utc>,
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveListedFile>,
}

const LIST_PAGE_SIZE: &str = "100";

/// Quotes a value for a Drive `q` string literal.
fn query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive search for non-trashed files named like `prefix` modified since `since`.
fn recent_files_query(prefix: &str, since: DateTime<Utc>) -> String {
    format!(
        "name contains '{}' and modifiedTime >= '{}' and trashed = false",
        query_literal(prefix),
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Shareable view link for a Drive file.
pub fn drive_view_link(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

/// Classifies a Drive API error response.
///
/// A rejected token means the caller has to sign in again, so 401 surfaces as
/// [`ErrorKind::AuthRequired`].
pub fn classify_drive_status(status: u16, body: &str) -> StageError {
    let message = format!("drive API returned {}: {}", status, body.trim());
    if status == 401 {
        return StageError::new(ErrorKind::AuthRequired, message);
    }
    StageError::from_http_status(status, ErrorKind::UploadError, message)
}

/// Uploads through the Drive v3 REST API.
///
/// The file is created with a media upload, then renamed and moved into the
/// configured parent, then optionally shared. A failure after the media
/// upload deletes the created file.
pub struct DriveUploader {
    client: reqwest::Client,
    config: DriveConfig,
    max_bytes: u64,
}

impl DriveUploader {
    pub fn new(config: DriveConfig, max_bytes: u64) -> StageOutcome<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::fatal(ErrorKind::ServiceUnavailable, e.to_string()))?;
        Ok(Self {
            client,
            config: DriveConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                ..config
            },
            max_bytes,
        })
    }

    fn token<'a>(&'a self, auth: &'a AuthContext) -> StageOutcome<&'a str> {
        let non_empty = |t: &&str| !t.is_empty();
        auth.bearer_token
            .as_deref()
            .filter(non_empty)
            .or(self.config.service_token.as_deref().filter(non_empty))
            .ok_or_else(|| {
                StageError::new(
                    ErrorKind::AuthRequired,
                    "Drive requires an authorization token",
                )
            })
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> StageOutcome<reqwest::Response> {
        let started = Instant::now();
        let result = request.send().await;
        let elapsed = started.elapsed().as_secs_f64();
        let response = result.map_err(|e| {
            metrics::record_external_call("drive", operation, elapsed, false);
            StageError::from_transport(&e)
        })?;

        let ok = response.status().is_success();
        metrics::record_external_call("drive", operation, elapsed, ok);
        if !ok {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_drive_status(status, &body));
        }
        Ok(response)
    }

    async fn create_media(&self, doc: &RenderedDocument, token: &str) -> StageOutcome<String> {
        let request = self
            .client
            .post(format!("{}/upload/drive/v3/files", self.config.api_base))
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, doc.mime_type)
            .body(doc.bytes.clone());
        let file: DriveFile = self
            .send("create_media", request)
            .await?
            .json()
            .await
            .map_err(|e| {
                StageError::new(ErrorKind::UploadError, format!("invalid drive response: {}", e))
            })?;
        Ok(file.id)
    }

    async fn finish(
        &self,
        file_id: &str,
        destination: &str,
        token: &str,
        reporter: &Reporter,
    ) -> StageOutcome<()> {
        let mut query = vec![("supportsAllDrives", "true")];
        if let Some(parent) = self.config.shared_drive_id.as_deref() {
            query.push(("addParents", parent));
        }
        let request = self
            .client
            .patch(format!("{}/drive/v3/files/{}", self.config.api_base, file_id))
            .query(&query)
            .bearer_auth(token)
            .json(&json!({ "name": destination }));
        self.send("update_metadata", request).await?;
        reporter.report(80, "Document named").await;

        if self.config.public_link {
            let request = self
                .client
                .post(format!(
                    "{}/drive/v3/files/{}/permissions",
                    self.config.api_base, file_id
                ))
                .query(&[("supportsAllDrives", "true")])
                .bearer_auth(token)
                .json(&json!({ "role": "reader", "type": "anyone" }));
            self.send("create_permission", request).await?;
            reporter.report(95, "Link sharing enabled").await;
        }
        Ok(())
    }

    async fn delete(&self, file_id: &str, token: &str) {
        let request = self
            .client
            .delete(format!("{}/drive/v3/files/{}", self.config.api_base, file_id))
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(token);
        match self.send("delete", request).await {
            Ok(_) => debug!(file_id, "Deleted partially uploaded file"),
            Err(e) => {
                metrics::CLEANUP_FAILURES
                    .with_label_values(&["remote_file"])
                    .inc();
                warn!(file_id, error = %e, "Failed to delete partially uploaded file");
            }
        }
    }
}

#[async_trait]
impl DocumentUploader for DriveUploader {
    fn name(&self) -> &str {
        "drive"
    }

    async fn upload(
        &self,
        doc: &RenderedDocument,
        destination: &str,
        auth: &AuthContext,
        reporter: &Reporter,
    ) -> StageOutcome<UploadReceipt> {
        let token = self.token(auth)?;
        if doc.len() as u64 > self.max_bytes {
            return Err(StageError::new(
                ErrorKind::SizeExceeded,
                format!("document exceeds the upload limit of {} bytes", self.max_bytes),
            ));
        }

        reporter.report(0, format!("Uploading {}", destination)).await;
        let file_id = self.create_media(doc, token).await?;
        reporter.report(60, "Document uploaded").await;

        if let Err(err) = self.finish(&file_id, destination, token, reporter).await {
            self.delete(&file_id, token).await;
            return Err(err);
        }

        info!(file_id = %file_id, destination, "Document uploaded to Drive");
        reporter.report(100, "Upload complete").await;
        Ok(UploadReceipt {
            link: drive_view_link(&file_id),
            remote_id: file_id,
        })
    }

    async fn list_recent(
        &self,
        prefix: &str,
        since: DateTime<Utc>,
        auth: &AuthContext,
    ) -> StageOutcome<Vec<RemoteDocument>> {
        let token = self.token(auth)?;
        let q = recent_files_query(prefix, since);
        let request = self
            .client
            .get(format!("{}/drive/v3/files", self.config.api_base))
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name,modifiedTime,webViewLink)"),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", LIST_PAGE_SIZE),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .bearer_auth(token);
        let list: DriveFileList = self
            .send("list_files", request)
            .await?
            .json()
            .await
            .map_err(|e| {
                StageError::new(ErrorKind::UploadError, format!("invalid drive response: {}", e))
            })?;

        debug!(prefix, count = list.files.len(), "Listed recent Drive files");
        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteDocument {
                link: f.web_view_link.unwrap_or_else(|| drive_view_link(&f.id)),
                remote_id: f.id,
                name: f.name,
                modified_at: f.modified_time,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageKind;
    use bytes::Bytes;

    fn doc() -> RenderedDocument {
        RenderedDocument {
            title: "Brief".to_string(),
            mime_type: "text/markdown",
            extension: "md",
            bytes: Bytes::from_static(b"# Brief\n"),
        }
    }

    #[tokio::test]
    async fn test_missing_token_requires_auth() {
        let uploader = DriveUploader::new(DriveConfig::default(), 1024).unwrap();

        let err = uploader
            .upload(
                &doc(),
                "Brief.md",
                &AuthContext::default(),
                &Reporter::noop(StageKind::Upload),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert!(!err.is_advancing());
    }

    #[test]
    fn test_caller_token_wins_over_service_token() {
        let config = DriveConfig {
            service_token: Some("service".to_string()),
            ..DriveConfig::default()
        };
        let uploader = DriveUploader::new(config, 1024).unwrap();

        let caller = AuthContext {
            bearer_token: Some("caller".to_string()),
            user_id: None,
        };
        assert_eq!(uploader.token(&caller).unwrap(), "caller");
        assert_eq!(uploader.token(&AuthContext::default()).unwrap(), "service");
    }

    #[test]
    fn test_empty_caller_token_falls_back_to_service_token() {
        let config = DriveConfig {
            service_token: Some("service".to_string()),
            ..DriveConfig::default()
        };
        let uploader = DriveUploader::new(config, 1024).unwrap();

        let empty = AuthContext {
            bearer_token: Some(String::new()),
            user_id: None,
        };
        assert_eq!(uploader.token(&empty).unwrap(), "service");

        let bare = DriveUploader::new(DriveConfig::default(), 1024).unwrap();
        assert_eq!(bare.token(&empty).unwrap_err().kind(), ErrorKind::AuthRequired);
    }

    #[test]
    fn test_recent_files_query() {
        let since = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            recent_files_query("Brief's", since),
            concat!(
                "name contains 'Brief\\'s' and ",
                "modifiedTime >= '2026-01-02T03:04:05Z' and trashed = false"
            )
        );
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_drive_status(401, "").kind(), ErrorKind::AuthRequired);
        assert_eq!(
            classify_drive_status(403, "").kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(classify_drive_status(400, "bad").kind(), ErrorKind::UploadError);
        assert_eq!(
            classify_drive_status(502, "").kind(),
            ErrorKind::ConnectionError
        );
    }

    #[test]
    fn test_view_link() {
        assert_eq!(
            drive_view_link("abc123"),
            "https://drive.google.com/file/d/abc123/view"
        );
    }

    mod stub {
        use axum::body::Bytes;
        use axum::extract::State;
        use axum::http::{HeaderMap, Method, StatusCode, Uri};
        use axum::response::{IntoResponse, Response};
        use axum::{Json, Router};
        use serde_json::json;
        use std::sync::{Arc, Mutex};

        #[derive(Debug, Clone)]
        pub struct Recorded {
            pub method: Method,
            pub path: String,
            pub query: String,
            pub authorization: Option<String>,
            pub body: Bytes,
        }

        /// In-process stand-in for the Drive v3 endpoints the uploader calls.
        #[derive(Clone, Default)]
        pub struct StubDrive {
            pub requests: Arc<Mutex<Vec<Recorded>>>,
            pub create_status: Option<StatusCode>,
            pub patch_status: Option<StatusCode>,
        }

        impl StubDrive {
            pub fn requests(&self) -> Vec<Recorded> {
                self.requests.lock().unwrap().clone()
            }

            /// Serves on an ephemeral port and returns the base URL.
            pub async fn serve(&self) -> String {
                let app = Router::new().fallback(handle).with_state(self.clone());
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
                format!("http://{}", addr)
            }
        }

        fn reply(status: Option<StatusCode>, ok: serde_json::Value) -> Response {
            match status {
                Some(status) => (status, "stub failure").into_response(),
                None => Json(ok).into_response(),
            }
        }

        async fn handle(
            State(stub): State<StubDrive>,
            method: Method,
            uri: Uri,
            headers: HeaderMap,
            body: Bytes,
        ) -> Response {
            let path = uri.path().to_string();
            stub.requests.lock().unwrap().push(Recorded {
                method: method.clone(),
                path: path.clone(),
                query: uri.query().unwrap_or_default().to_string(),
                authorization: headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                body,
            });

            match (method, path.as_str()) {
                (Method::POST, "/upload/drive/v3/files") => {
                    reply(stub.create_status, json!({ "id": "file-1" }))
                }
                (Method::PATCH, "/drive/v3/files/file-1") => {
                    reply(stub.patch_status, json!({ "id": "file-1" }))
                }
                (Method::POST, "/drive/v3/files/file-1/permissions") => {
                    Json(json!({ "id": "perm-1" })).into_response()
                }
                (Method::DELETE, "/drive/v3/files/file-1") => {
                    StatusCode::NO_CONTENT.into_response()
                }
                (Method::GET, "/drive/v3/files") => Json(json!({
                    "files": [
                        {
                            "id": "file-2",
                            "name": "Brief_b.md",
                            "modifiedTime": "2026-10-02T10:00:00.000Z",
                            "webViewLink": "https://drive.example/b"
                        },
                        {
                            "id": "file-1",
                            "name": "Brief_a.md",
                            "modifiedTime": "2026-10-01T10:00:00Z"
                        }
                    ]
                }))
                .into_response(),
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }
    }

    async fn stub_uploader(stub: &stub::StubDrive) -> DriveUploader {
        let config = DriveConfig {
            api_base: stub.serve().await,
            shared_drive_id: Some("folder-9".to_string()),
            ..DriveConfig::default()
        };
        DriveUploader::new(config, 1024).unwrap()
    }

    fn caller() -> AuthContext {
        AuthContext {
            bearer_token: Some("caller-token".to_string()),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_upload_creates_names_and_shares_file() {
        let drive = stub::StubDrive::default();
        let uploader = stub_uploader(&drive).await;

        let receipt = uploader
            .upload(&doc(), "Brief.md", &caller(), &Reporter::noop(StageKind::Upload))
            .await
            .unwrap();

        assert_eq!(receipt.remote_id, "file-1");
        assert_eq!(receipt.link, drive_view_link("file-1"));

        let requests = drive.requests();
        let calls: Vec<_> = requests
            .iter()
            .map(|r| (r.method.as_str(), r.path.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("POST", "/upload/drive/v3/files"),
                ("PATCH", "/drive/v3/files/file-1"),
                ("POST", "/drive/v3/files/file-1/permissions"),
            ]
        );
        assert!(requests
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer caller-token")));
        assert_eq!(&requests[0].body[..], b"# Brief\n");
        assert!(requests[0].query.contains("uploadType=media"));
        assert!(requests[1].query.contains("addParents=folder-9"));
        let rename: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(rename["name"], "Brief.md");
        let permission: serde_json::Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(permission["type"], "anyone");
    }

    #[tokio::test]
    async fn test_failed_rename_deletes_created_file() {
        let drive = stub::StubDrive {
            patch_status: Some(axum::http::StatusCode::BAD_GATEWAY),
            ..Default::default()
        };
        let uploader = stub_uploader(&drive).await;

        let err = uploader
            .upload(&doc(), "Brief.md", &caller(), &Reporter::noop(StageKind::Upload))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        let requests = drive.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.method, axum::http::Method::DELETE);
        assert_eq!(last.path, "/drive/v3/files/file-1");
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_token_requires_sign_in() {
        let drive = stub::StubDrive {
            create_status: Some(axum::http::StatusCode::UNAUTHORIZED),
            ..Default::default()
        };
        let uploader = stub_uploader(&drive).await;

        let err = uploader
            .upload(&doc(), "Brief.md", &caller(), &Reporter::noop(StageKind::Upload))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert!(!err.is_advancing());
        assert_eq!(drive.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_upload_is_permission_denied() {
        let drive = stub::StubDrive {
            create_status: Some(axum::http::StatusCode::FORBIDDEN),
            ..Default::default()
        };
        let uploader = stub_uploader(&drive).await;

        let err = uploader
            .upload(&doc(), "Brief.md", &caller(), &Reporter::noop(StageKind::Upload))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(drive.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_list_recent_reads_drive_listing() {
        let drive = stub::StubDrive::default();
        let uploader = stub_uploader(&drive).await;
        let since = Utc::now() - chrono::Duration::days(30);

        let documents = uploader.list_recent("Brief", since, &caller()).await.unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].remote_id, "file-2");
        assert_eq!(documents[0].link, "https://drive.example/b");
        assert_eq!(documents[1].name, "Brief_a.md");
        assert_eq!(documents[1].link, drive_view_link("file-1"));
        assert!(documents[0].modified_at > documents[1].modified_at);

        let requests = drive.requests();
        assert_eq!(requests.len(), 1);
        let query = &requests[0].query;
        assert!(query.contains("orderBy=modifiedTime+desc"));
        assert!(query.contains("pageSize=100"));
        assert!(query.contains("includeItemsFromAllDrives=true"));
        assert!(query.contains("trashed"));
    }
}
