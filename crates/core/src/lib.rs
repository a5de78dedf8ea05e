//! Core of briefsmith: an asynchronous job pipeline that turns an uploaded
//! document or recording into a generated briefing document.

pub mod config;
pub mod extract;
pub mod generate;
pub mod intake;
pub mod job;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod stage;
pub mod storage;
pub mod template;
pub mod testing;
pub mod transcribe;
pub mod upload;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use job::{Job, JobId, JobRegistry, JobState};
pub use pipeline::{JobInput, PipelineDriver, PipelineError, PipelineServices};
pub use stage::{ErrorKind, StageError, StageKind};
