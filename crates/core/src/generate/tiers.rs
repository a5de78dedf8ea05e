//! Generation tiers: one combined call, then one call per section.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::llm::{CompletionRequest, LlmClient};
use super::prompts::{self, SYSTEM_PROMPT};
use super::{
    GeneratedDocument, GeneratedSection, GenerationInput, UsageLedger, SECTION_PLACEHOLDER,
};
use crate::job::GenerationStep;
use crate::metrics;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome, Tier};

/// Walks the configured model list for a single logical call.
pub(crate) struct ModelCaller {
    client: Arc<dyn LlmClient>,
    models: Vec<String>,
}

impl ModelCaller {
    pub(crate) fn new(client: Arc<dyn LlmClient>, models: Vec<String>) -> Self {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        Self { client, models }
    }

    /// Tries each model in order. Only a missing or inaccessible model moves
    /// on to the next one; any other failure ends the call.
    ///
    /// The usage of a successful call is recorded in `usage` before the reply
    /// is returned, so it counts even if the caller rejects the reply.
    async fn call(
        &self,
        step: &str,
        request: CompletionRequest,
        usage: &UsageLedger,
    ) -> StageOutcome<String> {
        let provider = self.client.provider().to_string();
        let mut candidates = self.models.clone();
        if candidates.is_empty() {
            candidates.push(self.client.model().to_string());
        }

        let mut last_error = None;
        for model in candidates {
            let started = Instant::now();
            let result = self
                .client
                .complete(request.clone().with_model(model.clone()))
                .await;
            let elapsed = started.elapsed();
            metrics::record_external_call(
                &provider,
                step_label(step),
                elapsed.as_secs_f64(),
                result.is_ok(),
            );

            match result {
                Ok(response) => {
                    metrics::LLM_TOKENS
                        .with_label_values(&[&provider, "input"])
                        .inc_by(u64::from(response.usage.input_tokens));
                    metrics::LLM_TOKENS
                        .with_label_values(&[&provider, "output"])
                        .inc_by(u64::from(response.usage.output_tokens));
                    let record = GenerationStep {
                        step: step.to_string(),
                        model: if response.model.is_empty() { model } else { response.model },
                        input_tokens: response.usage.input_tokens,
                        output_tokens: response.usage.output_tokens,
                        latency_ms: elapsed.as_millis() as u64,
                    };
                    usage.record(record).await;
                    return Ok(response.text);
                }
                Err(e) if e.is_model_unavailable() => {
                    warn!(model = %model, step, error = %e, "Model unavailable, trying next model");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.to_stage_error()),
            }
        }

        Err(StageError::new(
            ErrorKind::ModelUnavailable,
            match last_error {
                Some(e) => format!("no configured model is available: {}", e),
                None => "no models configured".to_string(),
            },
        ))
    }
}

fn step_label(step: &str) -> &'static str {
    if step == ALL_SECTIONS_STEP {
        "complete_all"
    } else {
        "complete_section"
    }
}

const ALL_SECTIONS_STEP: &str = "all_sections";

/// Asks for every section in one JSON response.
pub struct BatchSectionsTier {
    caller: ModelCaller,
    max_tokens: u32,
    max_input_chars: usize,
}

impl BatchSectionsTier {
    pub fn new(
        client: Arc<dyn LlmClient>,
        models: Vec<String>,
        max_tokens: u32,
        max_input_chars: usize,
    ) -> Self {
        Self {
            caller: ModelCaller::new(client, models),
            max_tokens,
            max_input_chars,
        }
    }
}

#[async_trait]
impl Tier<GenerationInput, GeneratedDocument> for BatchSectionsTier {
    fn name(&self) -> &str {
        "batch_sections"
    }

    async fn run(
        &self,
        input: &GenerationInput,
        reporter: &Reporter,
    ) -> StageOutcome<GeneratedDocument> {
        reporter
            .report(0, format!("Generating {} sections", input.sections.len()))
            .await;

        let source = prompts::truncate_source(&input.text, self.max_input_chars);
        let request = CompletionRequest::new(prompts::batch_prompt(source, &input.sections))
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens);

        let text = self
            .caller
            .call(ALL_SECTIONS_STEP, request, &input.usage)
            .await?;

        let parsed = prompts::parse_sections_response(&text, &input.sections)
            .map_err(|e| StageError::new(ErrorKind::GenerationError, e))?;
        if parsed.iter().all(|(_, content)| content.is_none()) {
            return Err(StageError::new(
                ErrorKind::GenerationError,
                "response contained none of the requested sections",
            ));
        }

        let sections = parsed
            .into_iter()
            .map(|(name, content)| {
                if content.is_none() {
                    debug!(section = %name, "Section missing from response, using placeholder");
                }
                GeneratedSection {
                    name,
                    content: content.unwrap_or_else(|| SECTION_PLACEHOLDER.to_string()),
                }
            })
            .collect();

        reporter.report(100, "Sections generated").await;
        Ok(GeneratedDocument {
            sections,
            stats: input.usage.snapshot().await,
        })
    }
}

/// Generates each section with its own call.
///
/// A section whose call fails with a retryable error gets the placeholder
/// and the remaining sections are still generated. An aborting error ends
/// the tier, and so does every section failing.
pub struct PerSectionTier {
    caller: ModelCaller,
    max_tokens: u32,
    max_input_chars: usize,
}

impl PerSectionTier {
    pub fn new(
        client: Arc<dyn LlmClient>,
        models: Vec<String>,
        max_tokens: u32,
        max_input_chars: usize,
    ) -> Self {
        Self {
            caller: ModelCaller::new(client, models),
            max_tokens,
            max_input_chars,
        }
    }
}

#[async_trait]
impl Tier<GenerationInput, GeneratedDocument> for PerSectionTier {
    fn name(&self) -> &str {
        "per_section"
    }

    async fn run(
        &self,
        input: &GenerationInput,
        reporter: &Reporter,
    ) -> StageOutcome<GeneratedDocument> {
        let source = prompts::truncate_source(&input.text, self.max_input_chars);
        let total = input.sections.len().max(1);
        let mut sections = Vec::with_capacity(input.sections.len());
        let mut last_error = None;

        for (index, name) in input.sections.iter().enumerate() {
            let percent = (index * 100 / total) as u8;
            reporter
                .report(percent, format!("Generating section {}/{}: {}", index + 1, total, name))
                .await;

            let request =
                CompletionRequest::new(prompts::section_prompt(source, name, &input.sections))
                    .with_system(SYSTEM_PROMPT)
                    .with_max_tokens(self.max_tokens);
            let content = match self.caller.call(name, request, &input.usage).await {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => SECTION_PLACEHOLDER.to_string(),
                Err(e) if e.is_advancing() => {
                    warn!(
                        section = %name,
                        error = %e,
                        "Section generation failed, using placeholder"
                    );
                    last_error = Some(e);
                    SECTION_PLACEHOLDER.to_string()
                }
                Err(e) => return Err(e),
            };
            sections.push(GeneratedSection {
                name: name.clone(),
                content,
            });
        }

        if let Some(err) = last_error {
            if sections.iter().all(|s| s.content == SECTION_PLACEHOLDER) {
                return Err(err);
            }
        }

        reporter.report(100, "Sections generated").await;
        Ok(GeneratedDocument {
            sections,
            stats: input.usage.snapshot().await,
        })
    }
}
