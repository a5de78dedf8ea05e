//! Uploads into a local directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::{sanitize_file_name, AuthContext, DocumentUploader, RemoteDocument, UploadReceipt};
use crate::render::RenderedDocument;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome};

const CHUNK_SIZE: usize = 64 * 1024;
/// Numbered variants tried before giving up on a taken name.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// `report.md` -> `report-2.md`
fn numbered_name(name: &str, n: u32) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{}{}", &name[..dot], n, &name[dot..]),
        _ => format!("{}-{}", name, n),
    }
}

fn upload_error(msg: String) -> StageError {
    StageError::new(ErrorKind::UploadError, msg)
}

/// Writes documents into `dir` in chunks, stopping at `max_bytes`.
pub struct LocalUploader {
    dir: PathBuf,
    base_url: Option<String>,
    max_bytes: u64,
}

impl LocalUploader {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            base_url: None,
            max_bytes,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn link_for(&self, name: &str, path: &Path) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base, name),
            None => format!("file://{}", path.display()),
        }
    }

    /// Creates a file that did not exist before, numbering the name when
    /// it is already taken. Existing documents are never overwritten.
    async fn create_unique(&self, name: &str) -> StageOutcome<(String, PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.to_string()
            } else {
                numbered_name(name, attempt + 1)
            };
            let path = self.dir.join(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((candidate, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %candidate, "Output name taken, trying the next one");
                }
                Err(e) => {
                    return Err(upload_error(format!(
                        "failed to create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Err(upload_error(format!(
            "no free output name for {} after {} attempts",
            name, MAX_NAME_ATTEMPTS
        )))
    }

    async fn write(
        &self,
        doc: &RenderedDocument,
        file: File,
        path: &Path,
        reporter: &Reporter,
    ) -> StageOutcome<()> {
        let io_err =
            |e: io::Error| upload_error(format!("failed writing {}: {}", path.display(), e));

        let mut writer = BufWriter::new(file);
        let total = doc.bytes.len().max(1);
        let mut written: u64 = 0;

        for chunk in doc.bytes.chunks(CHUNK_SIZE) {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(StageError::new(
                    ErrorKind::SizeExceeded,
                    format!("document exceeds the upload limit of {} bytes", self.max_bytes),
                ));
            }
            writer.write_all(chunk).await.map_err(io_err)?;
            let percent = (written as usize * 90 / total) as u8;
            reporter.report(percent, "Uploading document").await;
        }

        writer.flush().await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentUploader for LocalUploader {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(
        &self,
        doc: &RenderedDocument,
        destination: &str,
        _auth: &AuthContext,
        reporter: &Reporter,
    ) -> StageOutcome<UploadReceipt> {
        reporter.report(0, format!("Uploading {}", destination)).await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StageError::new(
                ErrorKind::UploadError,
                format!("failed to create {}: {}", self.dir.display(), e),
            )
        })?;

        let (name, path, file) = self.create_unique(&sanitize_file_name(destination)).await?;

        if let Err(err) = self.write(doc, file, &path, reporter).await {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
                }
            }
            return Err(err);
        }

        info!(path = %path.display(), bytes = doc.len(), "Document stored");
        reporter.report(100, "Upload complete").await;
        Ok(UploadReceipt {
            remote_id: name.clone(),
            link: self.link_for(&name, &path),
        })
    }

    async fn list_recent(
        &self,
        prefix: &str,
        since: DateTime<Utc>,
        _auth: &AuthContext,
    ) -> StageOutcome<Vec<RemoteDocument>> {
        let list_err = |e: io::Error| {
            upload_error(format!("failed to list {}: {}", self.dir.display(), e))
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(list_err(e)),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) {
                continue;
            }
            let metadata = entry.metadata().await.map_err(list_err)?;
            if !metadata.is_file() {
                continue;
            }
            let modified_at: DateTime<Utc> = metadata.modified().map_err(list_err)?.into();
            if modified_at < since {
                continue;
            }
            documents.push(RemoteDocument {
                remote_id: name.clone(),
                link: self.link_for(&name, &entry.path()),
                name,
                modified_at,
            });
        }

        documents.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageKind;
    use bytes::Bytes;

    fn doc(bytes: Vec<u8>) -> RenderedDocument {
        RenderedDocument {
            title: "Brief".to_string(),
            mime_type: "text/markdown",
            extension: "md",
            bytes: Bytes::from(bytes),
        }
    }

    #[tokio::test]
    async fn test_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path(), 1024).with_base_url("http://files.local/");

        let receipt = uploader
            .upload(
                &doc(b"# Brief\n".to_vec()),
                "Brief_notes_abcd1234.md",
                &AuthContext::default(),
                &Reporter::noop(StageKind::Upload),
            )
            .await
            .unwrap();

        assert_eq!(receipt.remote_id, "Brief_notes_abcd1234.md");
        assert_eq!(receipt.link, "http://files.local/Brief_notes_abcd1234.md");
        let written = std::fs::read(dir.path().join("Brief_notes_abcd1234.md")).unwrap();
        assert_eq!(written, b"# Brief\n");
    }

    #[tokio::test]
    async fn test_oversized_document_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path(), 100_000);

        let err = uploader
            .upload(
                &doc(vec![b'x'; 200_000]),
                "big.md",
                &AuthContext::default(),
                &Reporter::noop(StageKind::Upload),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SizeExceeded);
        assert!(!dir.path().join("big.md").exists());
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path(), 1024);
        std::fs::write(dir.path().join("Brief_notes.md"), b"earlier").unwrap();

        let first = uploader
            .upload(
                &doc(b"first".to_vec()),
                "Brief_notes.md",
                &AuthContext::default(),
                &Reporter::noop(StageKind::Upload),
            )
            .await
            .unwrap();
        let second = uploader
            .upload(
                &doc(b"second".to_vec()),
                "Brief_notes.md",
                &AuthContext::default(),
                &Reporter::noop(StageKind::Upload),
            )
            .await
            .unwrap();

        assert_eq!(first.remote_id, "Brief_notes-2.md");
        assert_eq!(second.remote_id, "Brief_notes-3.md");
        assert_eq!(std::fs::read(dir.path().join("Brief_notes.md")).unwrap(), b"earlier");
        assert_eq!(std::fs::read(dir.path().join("Brief_notes-2.md")).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join("Brief_notes-3.md")).unwrap(), b"second");
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("report.md", 2), "report-2.md");
        assert_eq!(numbered_name("a.b.md", 3), "a.b-3.md");
        assert_eq!(numbered_name("README", 2), "README-2");
        assert_eq!(numbered_name(".hidden", 2), ".hidden-2");
    }

    #[tokio::test]
    async fn test_list_recent_filters_by_prefix_and_age() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path(), 1024);
        for name in ["Brief_a_1.md", "Brief_b_2.md", "notes.txt"] {
            uploader
                .upload(
                    &doc(b"x".to_vec()),
                    name,
                    &AuthContext::default(),
                    &Reporter::noop(StageKind::Upload),
                )
                .await
                .unwrap();
        }
        std::fs::create_dir(dir.path().join("Brief_dir")).unwrap();

        let since = Utc::now() - chrono::Duration::days(30);
        let recent = uploader
            .list_recent("Brief", since, &AuthContext::default())
            .await
            .unwrap();
        let mut names: Vec<_> = recent.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Brief_a_1.md", "Brief_b_2.md"]);
        assert!(recent[0].link.starts_with("file://"));

        let future = Utc::now() + chrono::Duration::days(1);
        let none = uploader
            .list_recent("Brief", future, &AuthContext::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_recent_without_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path().join("missing"), 1024);
        let recent = uploader
            .list_recent("Brief", Utc::now(), &AuthContext::default())
            .await
            .unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn test_destination_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path(), 1024);

        let receipt = uploader
            .upload(
                &doc(b"x".to_vec()),
                "../../etc/passwd",
                &AuthContext::default(),
                &Reporter::noop(StageKind::Upload),
            )
            .await
            .unwrap();

        assert!(!receipt.remote_id.contains('/'));
        assert!(dir.path().join(&receipt.remote_id).exists());
    }
}
