//! Job data types and lifecycle transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::stage::{ErrorKind, StageError};

/// Opaque job identifier, generated at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, for log lines and file names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One model call made while generating content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStep {
    /// What the call produced, e.g. `all_sections` or a section name.
    pub step: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

/// Generation statistics summed over every model call of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub calls: u32,
    pub steps: Vec<GenerationStep>,
}

impl GenerationStats {
    pub fn record(&mut self, step: GenerationStep) {
        self.input_tokens += u64::from(step.input_tokens);
        self.output_tokens += u64::from(step.output_tokens);
        self.latency_ms += step.latency_ms;
        self.calls += 1;
        self.steps.push(step);
    }

    pub fn merge(&mut self, other: GenerationStats) {
        for step in other.steps {
            self.record(step);
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Output reference of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Identifier of the uploaded document at its destination.
    pub remote_id: String,
    /// Shareable location of the uploaded document.
    pub link: String,
    /// Destination file name.
    pub destination: String,
    pub stats: GenerationStats,
}

/// Classified failure of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: ErrorKind,
    pub message: String,
}

impl From<&StageError> for JobFailure {
    fn from(err: &StageError) -> Self {
        Self {
            code: err.kind(),
            message: err.message().to_string(),
        }
    }
}

impl From<StageError> for JobFailure {
    fn from(err: StageError) -> Self {
        Self::from(&err)
    }
}

/// A lifecycle operation was attempted from a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {operation} job {job_id}: current state is {current}")]
pub struct JobTransitionError {
    pub job_id: JobId,
    pub current: JobState,
    pub operation: &'static str,
}

/// The unit of orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A new job in `Queued` with progress 0.
    pub fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            message: "Queued".to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn reject(&self, operation: &'static str) -> JobTransitionError {
        JobTransitionError {
            job_id: self.id,
            current: self.state,
            operation,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `Queued -> Processing`.
    pub fn start(&mut self, message: impl Into<String>) -> Result<(), JobTransitionError> {
        if self.state != JobState::Queued {
            return Err(self.reject("start"));
        }
        self.state = JobState::Processing;
        self.message = message.into();
        self.touch();
        Ok(())
    }

    /// Records progress while `Processing`. Lower values than the current
    /// progress keep the current value; the message is always replaced.
    pub fn advance(
        &mut self,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), JobTransitionError> {
        if self.state != JobState::Processing {
            return Err(self.reject("advance"));
        }
        self.progress = self.progress.max(progress.min(100));
        self.message = message.into();
        self.touch();
        Ok(())
    }

    /// `Processing -> Completed` with progress 100.
    pub fn complete(
        &mut self,
        result: JobResult,
        message: impl Into<String>,
    ) -> Result<(), JobTransitionError> {
        if self.state != JobState::Processing {
            return Err(self.reject("complete"));
        }
        self.state = JobState::Completed;
        self.progress = 100;
        self.message = message.into();
        self.result = Some(result);
        self.touch();
        Ok(())
    }

    /// `Queued | Processing -> Failed`. Progress keeps its last value.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), JobTransitionError> {
        if self.state.is_terminal() {
            return Err(self.reject("fail"));
        }
        self.state = JobState::Failed;
        self.message = failure.message.clone();
        self.error = Some(failure);
        self.touch();
        Ok(())
    }
}
