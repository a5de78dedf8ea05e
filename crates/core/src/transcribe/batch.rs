//! High-capacity batch tier over an OpenAI-compatible transcription endpoint.

use async_trait::async_trait;
use reqwest::multipart;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::config::BatchTierConfig;
use super::AudioInput;
use crate::metrics;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome, Tier};

/// Posts the whole file to `{api_base}/audio/transcriptions`.
pub struct WhisperBatchTier {
    client: reqwest::Client,
    api_base: Option<String>,
    api_key: Option<String>,
    model: String,
}

impl WhisperBatchTier {
    pub fn new(config: &BatchTierConfig) -> StageOutcome<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::new(ErrorKind::ServiceUnavailable, e.to_string()))?;
        Ok(Self {
            client,
            api_base: config
                .api_base
                .as_ref()
                .map(|b| b.trim_end_matches('/').to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Tier<AudioInput, String> for WhisperBatchTier {
    fn name(&self) -> &str {
        "batch"
    }

    async fn run(&self, input: &AudioInput, reporter: &Reporter) -> StageOutcome<String> {
        let base = self.api_base.as_deref().ok_or_else(|| {
            StageError::new(
                ErrorKind::ServiceUnavailable,
                "batch transcription endpoint is not configured",
            )
        })?;

        reporter.report(0, "Transcribing with batch engine").await;
        let audio = tokio::fs::read(&input.path).await.map_err(|e| {
            StageError::fatal(ErrorKind::Internal, format!("cannot read audio: {}", e))
        })?;

        let file_part = multipart::Part::bytes(audio)
            .file_name(input.file_name.clone())
            .mime_str(input.mime_type())
            .map_err(|e| StageError::new(ErrorKind::InvalidInput, format!("mime: {}", e)))?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file_part);

        debug!(model = %self.model, "Sending audio to batch transcription endpoint");
        let started = Instant::now();
        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", base))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| {
            let elapsed = started.elapsed().as_secs_f64();
            metrics::record_external_call("batch_transcription", "transcribe", elapsed, false);
            StageError::from_transport(&e)
        })?;

        let status = response.status();
        metrics::record_external_call(
            "batch_transcription",
            "transcribe",
            started.elapsed().as_secs_f64(),
            status.is_success(),
        );
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StageError::from_http_status(
                status.as_u16(),
                ErrorKind::TranscriptionFailed,
                format!("batch transcription returned {}: {}", status, body),
            ));
        }

        let transcript = response
            .text()
            .await
            .map_err(|e| StageError::from_transport(&e))?
            .trim()
            .to_string();
        if transcript.is_empty() {
            return Err(StageError::new(
                ErrorKind::NoSpeechDetected,
                "no speech detected in audio",
            ));
        }

        info!(chars = transcript.len(), "Batch transcription completed");
        reporter.report(100, "Batch transcription complete").await;
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::AudioKind;
    use crate::stage::StageKind;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_unavailable() {
        let tier = WhisperBatchTier::new(&BatchTierConfig::default()).unwrap();
        let input = AudioInput {
            path: PathBuf::from("/nonexistent.wav"),
            file_name: "a.wav".to_string(),
            kind: AudioKind::Wav,
            size_bytes: 10,
            duration_secs: Some(1.0),
        };
        let err = tier
            .run(&input, &Reporter::noop(StageKind::Transcribe))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }
}
