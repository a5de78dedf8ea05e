//! Per-user section lists used to shape generated documents.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use tokio::sync::RwLock;

use crate::extract::{docx_paragraphs, DocxParagraph};
use crate::stage::{ErrorKind, StageError, StageOutcome};

/// Longest paragraph still taken as a heading when it is bold or all caps.
const MAX_HEADING_CHARS: usize = 100;

/// Sections used when no template or override applies.
pub const DEFAULT_SECTIONS: [&str; 9] = [
    "Executive Summary",
    "Introduction",
    "Background",
    "Requirements",
    "Technical Specifications",
    "Timeline",
    "Budget",
    "Deliverables",
    "Conclusion",
];

pub fn default_sections() -> Vec<String> {
    DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect()
}

/// Source of a user's previously uploaded template structure.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn has_template(&self, user: &str) -> bool;

    /// Section list of the user's template, if any.
    async fn sections(&self, user: &str) -> Option<Vec<String>>;

    async fn store(&self, user: &str, sections: Vec<String>);
}

/// Picks the section list for a job: explicit override, then the user's
/// template, then [`DEFAULT_SECTIONS`].
pub async fn resolve_sections(
    provider: &dyn TemplateProvider,
    user: Option<&str>,
    requested: Option<Vec<String>>,
) -> Vec<String> {
    if let Some(sections) = requested.map(normalize_sections).filter(|s| !s.is_empty()) {
        return sections;
    }
    if let Some(user) = user {
        if provider.has_template(user).await {
            if let Some(sections) = provider.sections(user).await.map(normalize_sections) {
                if !sections.is_empty() {
                    return sections;
                }
            }
        }
    }
    default_sections()
}

/// Trims names, drops blanks and case-insensitive duplicates.
pub fn normalize_sections(sections: Vec<String>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    let mut out = Vec::new();
    for section in sections {
        let name = section.trim();
        if name.is_empty() {
            continue;
        }
        let key = name.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(name.to_string());
    }
    out
}

/// Section names taken from the headings of a base DOCX document.
///
/// Fails with `ExtractionError` when the file is not a readable DOCX or
/// has no heading paragraphs.
pub fn sections_from_docx(bytes: &[u8]) -> StageOutcome<Vec<String>> {
    let paragraphs = docx_paragraphs(Cursor::new(bytes))
        .map_err(|e| StageError::new(ErrorKind::ExtractionError, e))?;
    let sections = heading_sections(&paragraphs);
    if sections.is_empty() {
        return Err(StageError::new(
            ErrorKind::ExtractionError,
            "the document has no headings to use as sections",
        ));
    }
    Ok(sections)
}

/// Normalized text of every heading paragraph, in document order.
pub fn heading_sections(paragraphs: &[DocxParagraph]) -> Vec<String> {
    normalize_sections(
        paragraphs
            .iter()
            .filter(|p| is_heading(p))
            .map(|p| p.text.trim().to_string())
            .collect(),
    )
}

/// Heading and Title styles, or a short paragraph that is bold or all caps.
fn is_heading(paragraph: &DocxParagraph) -> bool {
    let text = paragraph.text.trim();
    if text.is_empty() {
        return false;
    }
    let styled = paragraph.style.as_deref().is_some_and(|style| {
        let style = style.to_ascii_lowercase();
        style.starts_with("heading") || style.starts_with("title")
    });
    if styled {
        return true;
    }
    let short = text.chars().count() < MAX_HEADING_CHARS;
    let shouting = text.chars().any(char::is_alphabetic)
        && text.chars().all(|c| !c.is_alphabetic() || c.is_uppercase());
    short && (paragraph.bold || shouting)
}

/// Template store kept in process memory.
#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateProvider for InMemoryTemplateStore {
    async fn has_template(&self, user: &str) -> bool {
        self.templates.read().await.contains_key(user)
    }

    async fn sections(&self, user: &str) -> Option<Vec<String>> {
        self.templates.read().await.get(user).cloned()
    }

    async fn store(&self, user: &str, sections: Vec<String>) {
        self.templates
            .write()
            .await
            .insert(user.to_string(), normalize_sections(sections));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{docx_bytes, styled_docx_bytes};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_defaults_without_template() {
        let store = InMemoryTemplateStore::new();
        let sections = resolve_sections(&store, Some("alice"), None).await;
        assert_eq!(sections.len(), 9);
        assert_eq!(sections[0], "Executive Summary");
        assert_eq!(sections[8], "Conclusion");
    }

    #[tokio::test]
    async fn test_template_sections_used() {
        let store = InMemoryTemplateStore::new();
        store.store("alice", names(&["Scope", "Risks"])).await;
        assert!(store.has_template("alice").await);
        assert!(!store.has_template("bob").await);

        let sections = resolve_sections(&store, Some("alice"), None).await;
        assert_eq!(sections, names(&["Scope", "Risks"]));
        let sections = resolve_sections(&store, Some("bob"), None).await;
        assert_eq!(sections.len(), 9);
    }

    #[tokio::test]
    async fn test_override_wins() {
        let store = InMemoryTemplateStore::new();
        store.store("alice", names(&["Scope"])).await;
        let sections =
            resolve_sections(&store, Some("alice"), Some(names(&["Pricing", " "]))).await;
        assert_eq!(sections, names(&["Pricing"]));
    }

    #[test]
    fn test_sections_from_styled_headings() {
        let bytes = styled_docx_bytes(&[
            (Some("Title"), "Transit RFP"),
            (Some("Heading1"), "Scope of Work"),
            (None, "The vendor supplies fare readers."),
            (Some("heading2"), "Pricing"),
            (Some("Normal"), "Fixed fee."),
            (None, "EVALUATION CRITERIA"),
            (Some("Heading1"), "scope of work"),
        ]);

        let sections = sections_from_docx(&bytes).unwrap();

        assert_eq!(
            sections,
            names(&["Transit RFP", "Scope of Work", "Pricing", "EVALUATION CRITERIA"])
        );
    }

    #[test]
    fn test_bold_short_paragraph_is_heading() {
        let paragraphs = vec![
            DocxParagraph {
                style: None,
                bold: true,
                text: "Budget".to_string(),
            },
            DocxParagraph {
                style: None,
                bold: true,
                text: "x".repeat(150),
            },
            DocxParagraph {
                style: None,
                bold: false,
                text: "2024 - 2025".to_string(),
            },
        ];
        assert_eq!(heading_sections(&paragraphs), names(&["Budget"]));
    }

    #[test]
    fn test_document_without_headings_is_rejected() {
        let bytes = docx_bytes(&["just a body paragraph", "and another one"]);
        let err = sections_from_docx(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionError);

        let err = sections_from_docx(b"not a docx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionError);
    }

    #[test]
    fn test_normalize_sections() {
        let out = normalize_sections(names(&[" Budget ", "budget", "", "Timeline"]));
        assert_eq!(out, names(&["Budget", "Timeline"]));
    }
}
