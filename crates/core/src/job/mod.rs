//! Jobs and the process-wide job registry.

mod registry;
mod types;

pub use registry::{JobRegistry, RegistryError};
pub use types::{
    GenerationStats, GenerationStep, Job, JobFailure, JobId, JobResult, JobState,
    JobTransitionError,
};
