//! Rendering generated sections into an output document.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::generate::GeneratedSection;
use crate::stage::{ErrorKind, StageError, StageOutcome};

/// A rendered document ready for upload.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub title: String,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub bytes: Bytes,
}

impl RenderedDocument {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Turns sections into a document, optionally on top of a base template.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        title: &str,
        sections: &[GeneratedSection],
        base_template: Option<&Path>,
    ) -> StageOutcome<RenderedDocument>;
}

/// Markdown output: a title heading and one second-level heading per section.
///
/// A base template may contain `{{title}}` and `{{body}}` markers. Without a
/// `{{body}}` marker the sections are appended after the template text.
#[derive(Debug, Clone, Default)]
pub struct MarkdownRenderer;

const TITLE_MARKER: &str = "{{title}}";
const BODY_MARKER: &str = "{{body}}";

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }

    fn body(sections: &[GeneratedSection]) -> String {
        let mut out = String::new();
        for section in sections {
            out.push_str("## ");
            out.push_str(section.name.trim());
            out.push_str("\n\n");
            out.push_str(section.content.trim());
            out.push_str("\n\n");
        }
        out
    }

    /// Renders into a string without touching the filesystem.
    pub fn render_markdown(
        title: &str,
        sections: &[GeneratedSection],
        base: Option<&str>,
    ) -> String {
        let body = Self::body(sections);
        let text = match base {
            Some(template) if template.contains(BODY_MARKER) => template
                .replace(TITLE_MARKER, title)
                .replace(BODY_MARKER, body.trim_end()),
            Some(template) => {
                let head = template.replace(TITLE_MARKER, title);
                format!("{}\n\n{}", head.trim_end(), body.trim_end())
            }
            None => format!("# {}\n\n{}", title, body.trim_end()),
        };
        format!("{}\n", text.trim_end())
    }
}

#[async_trait]
impl DocumentRenderer for MarkdownRenderer {
    async fn render(
        &self,
        title: &str,
        sections: &[GeneratedSection],
        base_template: Option<&Path>,
    ) -> StageOutcome<RenderedDocument> {
        let base = match base_template {
            Some(path) => Some(tokio::fs::read_to_string(path).await.map_err(|e| {
                StageError::fatal(
                    ErrorKind::Internal,
                    format!("failed to read base template {}: {}", path.display(), e),
                )
            })?),
            None => None,
        };

        let text = Self::render_markdown(title, sections, base.as_deref());
        Ok(RenderedDocument {
            title: title.to_string(),
            mime_type: "text/markdown",
            extension: "md",
            bytes: Bytes::from(text),
        })
    }
}
