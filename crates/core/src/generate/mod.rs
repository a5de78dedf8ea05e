//! Content generation: turns extracted text into named document sections.
//!
//! Two tiers share the stage window. The first asks for every section in one
//! JSON response; the second falls back to one call per section. Within a
//! tier, models are tried in configured order.

mod config;
mod llm;
mod prompts;
mod tiers;

pub use config::{GenerationConfig, LlmProvider};
pub use llm::{
    create_llm_client, AnthropicClient, CompletionRequest, CompletionResponse, LlmClient,
    LlmError, LlmUsage, OllamaClient,
};
pub use prompts::{parse_sections_response, strip_code_fence};
pub use tiers::{BatchSectionsTier, PerSectionTier};

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::job::{GenerationStats, GenerationStep};
use crate::stage::{
    AdvancePolicy, ErrorKind, FallbackChain, Reporter, StageError, StageKind, StageOutcome,
    TierAttempt,
};

/// Text used for a requested section the model did not produce.
pub const SECTION_PLACEHOLDER: &str = "[Content unavailable for this section]";

/// What a generation tier works from.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub text: String,
    pub sections: Vec<String>,
    /// Usage of every model call made for this input, across tiers.
    pub usage: Arc<UsageLedger>,
}

impl GenerationInput {
    pub fn new(text: impl Into<String>, sections: Vec<String>) -> Self {
        Self {
            text: text.into(),
            sections,
            usage: Arc::new(UsageLedger::default()),
        }
    }
}

/// Accumulates model call usage shared by every tier of one generation.
///
/// Calls whose reply a tier later rejects are still recorded.
#[derive(Debug, Default)]
pub struct UsageLedger {
    stats: Mutex<GenerationStats>,
}

impl UsageLedger {
    pub async fn record(&self, step: GenerationStep) {
        self.stats.lock().await.record(step);
    }

    pub async fn snapshot(&self) -> GenerationStats {
        self.stats.lock().await.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSection {
    pub name: String,
    pub content: String,
}

/// Sections in requested order plus usage statistics.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub sections: Vec<GeneratedSection>,
    pub stats: GenerationStats,
}

impl GeneratedDocument {
    /// Number of sections that fell back to the placeholder.
    pub fn placeholder_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.content == SECTION_PLACEHOLDER)
            .count()
    }
}

/// Runs the generation fallback chain.
pub struct SectionGenerator {
    chain: FallbackChain<GenerationInput, GeneratedDocument>,
}

impl SectionGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: &GenerationConfig) -> Self {
        let batch = BatchSectionsTier::new(
            Arc::clone(&client),
            config.models.clone(),
            config.max_tokens,
            config.max_input_chars,
        );
        let per_section = PerSectionTier::new(
            client,
            config.models.clone(),
            config.section_max_tokens,
            config.max_input_chars,
        );
        let chain = FallbackChain::new(StageKind::Generate)
            .with_tier(Arc::new(batch), AdvancePolicy::Classified)
            .with_tier(Arc::new(per_section), AdvancePolicy::Classified);
        Self { chain }
    }

    /// Builds the configured LLM client and the chain around it.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, LlmError> {
        let client = create_llm_client(config)?;
        Ok(Self::new(client, config))
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.chain.tier_names()
    }

    pub async fn generate(
        &self,
        text: &str,
        sections: &[String],
        reporter: &Reporter,
    ) -> StageOutcome<GeneratedDocument> {
        self.generate_with_attempts(text, sections, reporter).await.0
    }

    pub async fn generate_with_attempts(
        &self,
        text: &str,
        sections: &[String],
        reporter: &Reporter,
    ) -> (StageOutcome<GeneratedDocument>, Vec<TierAttempt>) {
        if sections.is_empty() {
            let err = StageError::fatal(ErrorKind::InvalidInput, "no sections requested");
            return (Err(err), Vec::new());
        }
        if text.trim().is_empty() {
            let err = StageError::fatal(ErrorKind::GenerationError, "source text is empty");
            return (Err(err), Vec::new());
        }
        let input = GenerationInput::new(text, sections.to_vec());
        let reporter = reporter.for_stage(StageKind::Generate);
        let (result, attempts) = self.chain.run_with_attempts(&input, &reporter).await;
        let result = match result {
            Ok(mut doc) => {
                doc.stats = input.usage.snapshot().await;
                Ok(doc)
            }
            Err(e) => Err(e),
        };
        (result, attempts)
    }
}
