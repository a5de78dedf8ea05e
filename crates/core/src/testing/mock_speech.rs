//! Mock speech recognition API.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::stage::{ErrorKind, StageError, StageOutcome};
use crate::transcribe::{OperationStatus, RecognitionAudio, RecognitionConfig, SpeechApi};

#[derive(Debug, Clone)]
struct OperationPlan {
    /// The poll on which the operation reports done.
    done_on_poll: u32,
    segments: Vec<String>,
}

/// Mock implementation of [`SpeechApi`].
///
/// - `recognize` returns the configured segments
/// - long-running operations report done on a chosen poll
/// - `set_next_error` fails whichever call comes next
#[derive(Debug, Default)]
pub struct MockSpeechApi {
    recognize_result: Arc<RwLock<Option<Vec<String>>>>,
    recognize_calls: Arc<RwLock<Vec<RecognitionConfig>>>,
    operation: Arc<RwLock<Option<OperationPlan>>>,
    started: Arc<RwLock<Vec<String>>>,
    polls: Arc<RwLock<u32>>,
    next_error: Arc<RwLock<Option<StageError>>>,
}

impl MockSpeechApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_recognize_result(&self, segments: Vec<String>) {
        *self.recognize_result.write().await = Some(segments);
    }

    /// Operations report running until poll number `polls`, then done with
    /// `segments`. `u32::MAX` never finishes.
    pub async fn set_operation_polls(&self, polls: u32, segments: Vec<String>) {
        *self.operation.write().await = Some(OperationPlan {
            done_on_poll: polls,
            segments,
        });
    }

    pub async fn set_next_error(&self, error: StageError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recognize_calls(&self) -> Vec<RecognitionConfig> {
        self.recognize_calls.read().await.clone()
    }

    /// URIs passed to `start_long_running`.
    pub async fn started_uris(&self) -> Vec<String> {
        self.started.read().await.clone()
    }

    pub async fn poll_count(&self) -> u32 {
        *self.polls.read().await
    }

    async fn take_error(&self) -> StageOutcome<()> {
        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SpeechApi for MockSpeechApi {
    async fn recognize(
        &self,
        config: &RecognitionConfig,
        _audio: RecognitionAudio,
    ) -> StageOutcome<Vec<String>> {
        self.recognize_calls.write().await.push(config.clone());
        self.take_error().await?;
        self.recognize_result.read().await.clone().ok_or_else(|| {
            StageError::new(ErrorKind::ServiceUnavailable, "no recognize result configured")
        })
    }

    async fn start_long_running(
        &self,
        _config: &RecognitionConfig,
        uri: &str,
    ) -> StageOutcome<String> {
        self.take_error().await?;
        let mut started = self.started.write().await;
        started.push(uri.to_string());
        Ok(format!("operations/mock-{}", started.len()))
    }

    async fn poll_operation(&self, _name: &str) -> StageOutcome<OperationStatus> {
        self.take_error().await?;
        let poll = {
            let mut polls = self.polls.write().await;
            *polls += 1;
            *polls
        };
        let plan = self.operation.read().await.clone().ok_or_else(|| {
            StageError::new(ErrorKind::ServiceUnavailable, "no operation configured")
        })?;
        if poll >= plan.done_on_poll {
            Ok(OperationStatus::Done(plan.segments))
        } else {
            Ok(OperationStatus::Running {
                progress_percent: None,
            })
        }
    }
}
