//! Text extraction from documents.

mod docx;
mod sanitize;

pub use docx::{
    document_paragraphs, document_xml_text, docx_paragraphs, docx_text, DocxParagraph,
};
pub use sanitize::sanitize_extracted_text;

use async_trait::async_trait;
use pdf_oxide::PdfDocument;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::intake::DocumentKind;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome};

const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a local document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        path: &Path,
        kind: DocumentKind,
        reporter: &Reporter,
    ) -> StageOutcome<String>;
}

/// Extractor backed by the local file system.
#[derive(Debug, Clone)]
pub struct FileTextExtractor {
    timeout: Duration,
}

impl Default for FileTextExtractor {
    fn default() -> Self {
        Self {
            timeout: EXTRACTION_TIMEOUT,
        }
    }
}

fn extraction_error(msg: impl Into<String>) -> StageError {
    StageError::new(ErrorKind::ExtractionError, msg)
}

impl FileTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn pdf_text(path: &Path) -> Result<String, String> {
        let mut doc = PdfDocument::open(path).map_err(|e| format!("failed to parse PDF: {e}"))?;
        let page_count = doc
            .page_count()
            .map_err(|e| format!("failed to read page count: {e}"))?;

        join_pages(page_count, |page_index| doc.extract_text(page_index))
    }

    fn docx_file_text(path: &Path) -> Result<String, String> {
        let file = std::fs::File::open(path).map_err(|e| format!("failed to open: {e}"))?;
        docx_text(std::io::BufReader::new(file))
    }

    async fn blocking(
        &self,
        path: &Path,
        f: fn(&Path) -> Result<String, String>,
    ) -> StageOutcome<String> {
        let path: PathBuf = path.to_path_buf();
        tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(move || f(&path)))
            .await
            .map_err(|_| extraction_error("text extraction timed out"))?
            .map_err(|e| {
                StageError::fatal(ErrorKind::Internal, format!("extraction task failed: {e}"))
            })?
            .map_err(extraction_error)
    }
}

/// Joins the text of every page, skipping blank pages.
///
/// Pages that fail are logged and counted. The document fails only when no
/// page produced text and at least one page failed.
fn join_pages<E: std::fmt::Display>(
    page_count: usize,
    mut page_text: impl FnMut(usize) -> Result<String, E>,
) -> Result<String, String> {
    let mut pages = Vec::with_capacity(page_count);
    let mut failed_pages = 0usize;
    for page_index in 0..page_count {
        match page_text(page_index) {
            Ok(text) if !text.trim().is_empty() => pages.push(text),
            Ok(_) => {}
            Err(e) => {
                failed_pages += 1;
                warn!(page = page_index, error = %e, "Failed to extract PDF page text");
            }
        }
    }
    if failed_pages > 0 {
        warn!(failed_pages, page_count, "Some PDF pages yielded no text");
        if pages.is_empty() {
            return Err(format!(
                "failed to extract text from {} of {} pages",
                failed_pages, page_count
            ));
        }
    }
    Ok(pages.join("\n\n"))
}

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract(
        &self,
        path: &Path,
        kind: DocumentKind,
        reporter: &Reporter,
    ) -> StageOutcome<String> {
        reporter.report(0, "Extracting text").await;

        let raw = match kind {
            DocumentKind::Text | DocumentKind::Markdown => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| extraction_error(format!("failed to read file: {e}")))?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            DocumentKind::Pdf => self.blocking(path, Self::pdf_text).await?,
            DocumentKind::Docx => self.blocking(path, Self::docx_file_text).await?,
        };

        let text = sanitize_extracted_text(&raw);
        if text.is_empty() {
            return Err(extraction_error(
                "could not extract content: the document contains no text",
            ));
        }

        debug!(chars = text.len(), ?kind, "Extracted text");
        reporter
            .report(100, format!("Extracted {} characters", text.chars().count()))
            .await;
        Ok(text)
    }
}
