//! Synchronous low-latency recognition with inline audio.

use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tracing::info;

use super::config::{SpeechApiConfig, SyncTierConfig};
use super::speech::{RecognitionAudio, SpeechApi};
use super::AudioInput;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome, Tier};

pub struct SyncRecognizeTier {
    api: Arc<dyn SpeechApi>,
    limits: SyncTierConfig,
    speech: SpeechApiConfig,
}

impl SyncRecognizeTier {
    pub fn new(api: Arc<dyn SpeechApi>, limits: SyncTierConfig, speech: SpeechApiConfig) -> Self {
        Self { api, limits, speech }
    }
}

#[async_trait]
impl Tier<AudioInput, String> for SyncRecognizeTier {
    fn name(&self) -> &str {
        "sync"
    }

    async fn run(&self, input: &AudioInput, reporter: &Reporter) -> StageOutcome<String> {
        if input.size_bytes > self.limits.max_bytes {
            return Err(StageError::tier_local(
                ErrorKind::SizeExceeded,
                format!(
                    "{} bytes is over the synchronous limit of {} bytes",
                    input.size_bytes, self.limits.max_bytes
                ),
            ));
        }
        if let Some(duration) = input.duration_secs {
            if duration > f64::from(self.limits.max_duration_secs) {
                return Err(StageError::new(
                    ErrorKind::DurationExceeded,
                    format!(
                        "{:.1}s of audio is over the synchronous limit of {}s",
                        duration, self.limits.max_duration_secs
                    ),
                ));
            }
        }

        reporter.report(0, "Transcribing audio").await;
        let bytes = tokio::fs::read(&input.path).await.map_err(|e| {
            StageError::fatal(ErrorKind::Internal, format!("cannot read audio: {}", e))
        })?;
        let content = base64::engine::general_purpose::STANDARD.encode(bytes);
        reporter.report(20, "Sending audio for recognition").await;

        let config = input.recognition_config(&self.speech);
        let segments = match self.api.recognize(&config, RecognitionAudio::Content(content)).await {
            Ok(segments) => segments,
            // Without a probed duration the length limit can only be learned
            // from the service rejecting the payload.
            Err(e) if e.kind() == ErrorKind::InvalidInput && input.duration_secs.is_none() => {
                return Err(StageError::tier_local(
                    ErrorKind::DurationExceeded,
                    format!("synchronous recognition rejected the audio: {}", e.message()),
                ));
            }
            Err(e) => return Err(e),
        };

        let transcript = segments.join(" ");
        if transcript.trim().is_empty() {
            return Err(StageError::new(
                ErrorKind::NoSpeechDetected,
                "no speech detected in audio",
            ));
        }

        info!(chars = transcript.len(), "Synchronous transcription completed");
        reporter.report(100, "Transcription complete").await;
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::AudioKind;
    use crate::stage::StageKind;
    use crate::testing::MockSpeechApi;
    use tempfile::TempDir;

    async fn input(dir: &TempDir, size: usize, duration: Option<f64>) -> AudioInput {
        let path = dir.path().join("a.wav");
        tokio::fs::write(&path, vec![1u8; size]).await.unwrap();
        AudioInput {
            path,
            file_name: "a.wav".to_string(),
            kind: AudioKind::Wav,
            size_bytes: size as u64,
            duration_secs: duration,
        }
    }

    fn tier(api: Arc<MockSpeechApi>) -> SyncRecognizeTier {
        SyncRecognizeTier::new(
            api,
            SyncTierConfig {
                max_bytes: 1000,
                max_duration_secs: 60,
                ..SyncTierConfig::default()
            },
            SpeechApiConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_recognizes_short_audio() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockSpeechApi::new());
        api.set_recognize_result(vec!["hello".to_string(), "there".to_string()]).await;

        let text = tier(api.clone())
            .run(&input(&dir, 100, Some(5.0)).await, &Reporter::noop(StageKind::Transcribe))
            .await
            .unwrap();
        assert_eq!(text, "hello there");

        let calls = api.recognize_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].encoding, "LINEAR16");
        assert_eq!(calls[0].sample_rate_hertz, 16000);
        assert!(calls[0].enable_automatic_punctuation);
    }

    #[tokio::test]
    async fn test_long_audio_is_duration_exceeded() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockSpeechApi::new());
        let err = tier(api.clone())
            .run(&input(&dir, 100, Some(90.0)).await, &Reporter::noop(StageKind::Transcribe))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DurationExceeded);
        assert!(err.is_advancing());
        assert!(api.recognize_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_tier_local() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockSpeechApi::new());
        let err = tier(api)
            .run(&input(&dir, 2000, None).await, &Reporter::noop(StageKind::Transcribe))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeExceeded);
        assert!(err.is_advancing());
    }

    #[tokio::test]
    async fn test_empty_result_is_no_speech() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockSpeechApi::new());
        api.set_recognize_result(vec![]).await;
        let err = tier(api)
            .run(&input(&dir, 100, Some(2.0)).await, &Reporter::noop(StageKind::Transcribe))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpeechDetected);
    }

    #[tokio::test]
    async fn test_rejection_of_unprobed_audio_advances() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(MockSpeechApi::new());
        api.set_next_error(StageError::new(ErrorKind::InvalidInput, "Sync input too long"))
            .await;
        let err = tier(api)
            .run(&input(&dir, 100, None).await, &Reporter::noop(StageKind::Transcribe))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DurationExceeded);
    }
}
