//! Job pipeline: intake, extraction or transcription, generation, render
//! and upload, with progress windows and guaranteed cleanup.
//!
//! Each submitted job runs in its own task. Stages of one job run strictly
//! in order; any stage failure ends the job as `Failed` with the stage's
//! classified error.

mod config;
mod driver;
mod types;

pub use config::{PipelineConfig, StageWindows};
pub use driver::{output_name, source_stem, PipelineDriver, PipelineServices};
pub use types::{JobInput, PipelineError};
