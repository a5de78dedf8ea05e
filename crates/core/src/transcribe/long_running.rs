//! Long-running recognition of staged audio.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{LongRunningConfig, SpeechApiConfig};
use super::speech::{OperationStatus, SpeechApi};
use super::AudioInput;
use crate::metrics;
use crate::stage::{ErrorKind, ProgressWindow, Reporter, StageError, StageOutcome, Tier};
use crate::storage::ObjectStager;

/// Highest progress reported before the operation finishes.
const MAX_ESTIMATE: u8 = 95;

const STAGING_WINDOW: ProgressWindow = ProgressWindow::fixed(0, 10);
const POLLING_WINDOW: ProgressWindow = ProgressWindow::fixed(10, 100);

/// Stages the audio, submits it and polls until done or the wait cap.
///
/// The staged object is deleted on every exit path.
pub struct LongRunningTier {
    api: Arc<dyn SpeechApi>,
    stager: Arc<dyn ObjectStager>,
    speech: SpeechApiConfig,
    poll_interval: Duration,
    max_wait: Duration,
    estimated_duration: Duration,
}

impl LongRunningTier {
    pub fn new(
        api: Arc<dyn SpeechApi>,
        stager: Arc<dyn ObjectStager>,
        speech: SpeechApiConfig,
        config: &LongRunningConfig,
    ) -> Self {
        Self {
            api,
            stager,
            speech,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            estimated_duration: config.estimated_duration(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_estimated_duration(mut self, estimate: Duration) -> Self {
        self.estimated_duration = estimate;
        self
    }

    fn estimate(&self, elapsed: Duration) -> u8 {
        let total = self.estimated_duration.as_millis().max(1);
        let percent = elapsed.as_millis() * 100 / total;
        percent.min(u128::from(MAX_ESTIMATE)) as u8
    }

    async fn recognize_staged(
        &self,
        uri: &str,
        input: &AudioInput,
        reporter: &Reporter,
    ) -> StageOutcome<String> {
        let config = input.recognition_config(&self.speech);
        let operation = self.api.start_long_running(&config, uri).await?;
        reporter.report(0, "Transcription submitted").await;

        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.max_wait {
                return Err(StageError::new(
                    ErrorKind::TranscriptionTimeout,
                    format!(
                        "transcription did not finish within {}s",
                        self.max_wait.as_secs_f64()
                    ),
                ));
            }
            tokio::time::sleep(self.poll_interval.min(self.max_wait - elapsed)).await;

            polls += 1;
            match self.api.poll_operation(&operation).await? {
                OperationStatus::Done(segments) => {
                    let transcript = segments.join(" ");
                    if transcript.trim().is_empty() {
                        return Err(StageError::new(
                            ErrorKind::NoSpeechDetected,
                            "no speech detected in audio",
                        ));
                    }
                    info!(polls, chars = transcript.len(), "Long-running transcription completed");
                    return Ok(transcript);
                }
                OperationStatus::Running { progress_percent } => {
                    let elapsed = started.elapsed();
                    let percent = self.estimate(elapsed);
                    debug!(polls, ?progress_percent, percent, "Transcription still running");
                    reporter
                        .report(
                            percent,
                            format!("Transcribing... {}s elapsed", elapsed.as_secs()),
                        )
                        .await;
                }
            }
        }
    }
}

#[async_trait]
impl Tier<AudioInput, String> for LongRunningTier {
    fn name(&self) -> &str {
        "long_running"
    }

    async fn run(&self, input: &AudioInput, reporter: &Reporter) -> StageOutcome<String> {
        let staging = reporter.child(STAGING_WINDOW);
        let polling = reporter.child(POLLING_WINDOW);

        staging.report(0, "Staging audio for long-running transcription").await;
        let uri = self.stager.upload(&input.path).await?;
        staging.report(100, "Audio staged").await;

        let result = self.recognize_staged(&uri, input, &polling).await;

        if let Err(e) = self.stager.delete(&uri).await {
            metrics::CLEANUP_FAILURES
                .with_label_values(&["staged_object"])
                .inc();
            warn!(uri = %uri, error = %e, "Failed to delete staged audio");
        }

        if result.is_ok() {
            polling.report(100, "Transcription complete").await;
        }
        result
    }
}
