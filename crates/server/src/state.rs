use std::sync::Arc;
use briefsmith_core::template::TemplateProvider;
use briefsmith_core::{Config, PipelineDriver, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    driver: PipelineDriver,
    templates: Arc<dyn TemplateProvider>,
}

impl AppState {
    pub fn new(
        config: Config,
        driver: PipelineDriver,
        templates: Arc<dyn TemplateProvider>,
    ) -> Self {
        Self {
            config,
            driver,
            templates,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn driver(&self) -> &PipelineDriver {
        &self.driver
    }

    pub fn templates(&self) -> &dyn TemplateProvider {
        self.templates.as_ref()
    }

    /// Largest request body accepted on job submission.
    pub fn max_request_bytes(&self) -> usize {
        let cap = self.config.pipeline.max_input_bytes.saturating_add(1024 * 1024);
        usize::try_from(cap).unwrap_or(usize::MAX)
    }
}
