//! Audio transcription through an ordered fallback of engines.
//!
//! Tiers, highest capability first:
//! 1. [`WhisperBatchTier`]: any failure advances.
//! 2. [`SyncRecognizeTier`]: advances only when the audio is too long or too
//!    large for inline recognition.
//! 3. [`LongRunningTier`]: stages the audio and polls a long-running
//!    operation.

mod batch;
mod config;
mod long_running;
mod speech;
mod sync_tier;

pub use batch::WhisperBatchTier;
pub use config::{
    BatchTierConfig, LongRunningConfig, SpeechApiConfig, SyncTierConfig, TranscriptionConfig,
};
pub use long_running::LongRunningTier;
pub use speech::{
    classify_api_status, ApiStatus, GoogleSpeechClient, OperationStatus, RecognitionAudio,
    RecognitionConfig, SpeechApi,
};
pub use sync_tier::SyncRecognizeTier;

use std::path::PathBuf;
use std::sync::Arc;

use crate::intake::{AudioKind, SourceKind, StagedInput};
use crate::stage::{
    AdvancePolicy, ErrorKind, FallbackChain, Reporter, StageKind, StageOutcome, Tier, TierAttempt,
};
use crate::storage::ObjectStager;

/// Audio file handed to the transcription tiers.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: AudioKind,
    pub size_bytes: u64,
    /// Known only for formats whose header can be probed.
    pub duration_secs: Option<f64>,
}

impl AudioInput {
    pub fn from_staged(staged: &StagedInput, kind: AudioKind, duration_secs: Option<f64>) -> Self {
        Self {
            path: staged.path.clone(),
            file_name: staged.file_name.clone(),
            kind,
            size_bytes: staged.size_bytes,
            duration_secs,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        SourceKind::Audio(self.kind).mime_type()
    }

    pub fn recognition_config(&self, speech: &SpeechApiConfig) -> RecognitionConfig {
        RecognitionConfig {
            encoding: self.kind.speech_encoding().to_string(),
            sample_rate_hertz: speech.sample_rate_hz,
            language_code: speech.language_code.clone(),
            enable_automatic_punctuation: true,
        }
    }
}

type AudioTier = Arc<dyn Tier<AudioInput, String>>;

/// Transcription fallback chain.
pub struct TranscriptionChain {
    chain: FallbackChain<AudioInput, String>,
}

impl TranscriptionChain {
    pub fn builder() -> TranscriptionChainBuilder {
        TranscriptionChainBuilder::default()
    }

    /// Builds the enabled tiers from configuration.
    pub fn from_config(
        config: &TranscriptionConfig,
        speech: Arc<dyn SpeechApi>,
        stager: Arc<dyn ObjectStager>,
    ) -> StageOutcome<Self> {
        let mut builder = Self::builder();
        if config.batch.enabled {
            builder = builder.batch(Arc::new(WhisperBatchTier::new(&config.batch)?));
        }
        if config.sync.enabled {
            builder = builder.sync(Arc::new(SyncRecognizeTier::new(
                Arc::clone(&speech),
                config.sync.clone(),
                config.speech.clone(),
            )));
        }
        if config.long_running.enabled {
            builder = builder.long_running(Arc::new(LongRunningTier::new(
                speech,
                stager,
                config.speech.clone(),
                &config.long_running,
            )));
        }
        Ok(builder.build())
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.chain.tier_names()
    }

    pub async fn transcribe(
        &self,
        input: &AudioInput,
        reporter: &Reporter,
    ) -> StageOutcome<String> {
        self.chain.run(input, &reporter.for_stage(StageKind::Transcribe)).await
    }

    pub async fn transcribe_with_attempts(
        &self,
        input: &AudioInput,
        reporter: &Reporter,
    ) -> (StageOutcome<String>, Vec<TierAttempt>) {
        self.chain
            .run_with_attempts(input, &reporter.for_stage(StageKind::Transcribe))
            .await
    }
}

/// Assembles the chain in tier order regardless of call order.
#[derive(Default)]
pub struct TranscriptionChainBuilder {
    batch: Option<AudioTier>,
    sync: Option<AudioTier>,
    long_running: Option<AudioTier>,
}

impl TranscriptionChainBuilder {
    pub fn batch(mut self, tier: AudioTier) -> Self {
        self.batch = Some(tier);
        self
    }

    pub fn sync(mut self, tier: AudioTier) -> Self {
        self.sync = Some(tier);
        self
    }

    pub fn long_running(mut self, tier: AudioTier) -> Self {
        self.long_running = Some(tier);
        self
    }

    pub fn build(self) -> TranscriptionChain {
        let mut chain = FallbackChain::new(StageKind::Transcribe);
        if let Some(tier) = self.batch {
            chain = chain.with_tier(tier, AdvancePolicy::AnyFailure);
        }
        if let Some(tier) = self.sync {
            chain = chain.with_tier(
                tier,
                AdvancePolicy::Only(vec![ErrorKind::DurationExceeded, ErrorKind::SizeExceeded]),
            );
        }
        if let Some(tier) = self.long_running {
            chain = chain.with_tier(tier, AdvancePolicy::Classified);
        }
        TranscriptionChain { chain }
    }
}
