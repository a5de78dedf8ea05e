//! Wires concrete collaborators from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use briefsmith_core::extract::FileTextExtractor;
use briefsmith_core::generate::SectionGenerator;
use briefsmith_core::render::MarkdownRenderer;
use briefsmith_core::storage::ObjectStoreStager;
use briefsmith_core::template::{InMemoryTemplateStore, TemplateProvider};
use briefsmith_core::transcribe::{GoogleSpeechClient, TranscriptionChain};
use briefsmith_core::upload::create_uploader;
use briefsmith_core::{Config, JobRegistry, PipelineDriver, PipelineServices};

use crate::state::AppState;

/// Builds the pipeline services described by `config`.
pub fn build_services(
    config: &Config,
    templates: Arc<dyn TemplateProvider>,
) -> Result<PipelineServices> {
    let speech = Arc::new(
        GoogleSpeechClient::new(&config.transcription.speech)
            .context("Failed to create speech client")?,
    );
    let stager = Arc::new(
        ObjectStoreStager::from_config(&config.transcription.staging)
            .context("Failed to create staging store")?,
    );
    let transcriber = TranscriptionChain::from_config(&config.transcription, speech, stager)
        .context("Failed to build transcription tiers")?;
    info!(tiers = ?transcriber.tier_names(), "Transcription tiers ready");

    let generator = SectionGenerator::from_config(&config.generation)
        .context("Failed to create LLM client")?;
    info!(
        tiers = ?generator.tier_names(),
        models = ?config.generation.models,
        "Generation tiers ready"
    );

    let uploader = create_uploader(&config.upload).context("Failed to create uploader")?;
    info!(backend = uploader.name(), "Uploader ready");

    Ok(PipelineServices {
        extractor: Arc::new(FileTextExtractor::new()),
        transcriber: Arc::new(transcriber),
        generator: Arc::new(generator),
        templates,
        renderer: Arc::new(MarkdownRenderer::new()),
        uploader,
    })
}

/// Builds the whole application state from configuration.
pub fn build_state(config: Config) -> Result<AppState> {
    let templates: Arc<dyn TemplateProvider> = Arc::new(InMemoryTemplateStore::new());
    let services = build_services(&config, Arc::clone(&templates))?;
    let driver = PipelineDriver::new(
        config.pipeline.clone(),
        Arc::new(JobRegistry::new()),
        services,
    );
    Ok(AppState::new(config, driver, templates))
}
