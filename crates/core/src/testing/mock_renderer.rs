//! Mock document renderer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::generate::GeneratedSection;
use crate::render::{DocumentRenderer, MarkdownRenderer, RenderedDocument};
use crate::stage::{StageError, StageOutcome};

/// Renders markdown in memory and records what it was asked to render.
#[derive(Debug, Default)]
pub struct MockRenderer {
    rendered: Arc<RwLock<Vec<(String, Vec<GeneratedSection>, Option<PathBuf>)>>>,
    next_error: Arc<RwLock<Option<StageError>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }

    /// Section lists passed to `render`, one per call.
    pub async fn rendered_sections(&self) -> Vec<Vec<GeneratedSection>> {
        self.rendered
            .read()
            .await
            .iter()
            .map(|(_, sections, _)| sections.clone())
            .collect()
    }

    pub async fn titles(&self) -> Vec<String> {
        self.rendered.read().await.iter().map(|(t, _, _)| t.clone()).collect()
    }
}

#[async_trait]
impl DocumentRenderer for MockRenderer {
    async fn render(
        &self,
        title: &str,
        sections: &[GeneratedSection],
        base_template: Option<&Path>,
    ) -> StageOutcome<RenderedDocument> {
        self.rendered.write().await.push((
            title.to_string(),
            sections.to_vec(),
            base_template.map(Path::to_path_buf),
        ));
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        let text = MarkdownRenderer::render_markdown(title, sections, None);
        Ok(RenderedDocument {
            title: title.to_string(),
            mime_type: "text/markdown",
            extension: "md",
            bytes: text.into(),
        })
    }
}
