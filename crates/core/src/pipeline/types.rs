//! Types for the pipeline driver.

use thiserror::Error;

use crate::intake::JobSource;
use crate::job::{JobId, RegistryError};
use crate::stage::StageError;
use crate::upload::AuthContext;

/// Everything a submission carries.
#[derive(Debug)]
pub struct JobInput {
    pub source: JobSource,
    /// Name the file was submitted under; its extension selects the handling.
    pub file_name: String,
    pub content_type: Option<String>,
    /// Declared size, used for early rejection and progress.
    pub size_hint: Option<u64>,
    /// Explicit section list overriding any template.
    pub sections: Option<Vec<String>>,
    pub auth: AuthContext,
}

impl JobInput {
    pub fn new(source: JobSource, file_name: impl Into<String>) -> Self {
        Self {
            source,
            file_name: file_name.into(),
            content_type: None,
            size_hint: None,
            sections: None,
            auth: AuthContext::default(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn with_sections(mut self, sections: Vec<String>) -> Self {
        self.sections = Some(sections);
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }
}

/// Errors returned by the driver's own API. Stage failures end up on the job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The submission was refused before a job was created.
    #[error("submission rejected: {0}")]
    Rejected(StageError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("registry error: {0}")]
    Registry(RegistryError),
}

impl From<RegistryError> for PipelineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Registry(other),
        }
    }
}
