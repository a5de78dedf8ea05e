//! Transcription configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::storage::StagingConfig;

/// Configuration for every transcription tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub batch: BatchTierConfig,
    #[serde(default)]
    pub sync: SyncTierConfig,
    #[serde(default)]
    pub long_running: LongRunningConfig,
    #[serde(default)]
    pub speech: SpeechApiConfig,
    #[serde(default)]
    pub staging: StagingConfig,
}

/// High-capacity batch engine (OpenAI-compatible transcription endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoint base, e.g. `https://api.openai.com/v1`. Unset means the tier
    /// reports itself unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_model")]
    pub model: String,
    #[serde(default = "default_batch_timeout")]
    pub timeout_secs: u64,
}

impl Default for BatchTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: None,
            api_key: None,
            model: default_batch_model(),
            timeout_secs: default_batch_timeout(),
        }
    }
}

/// Synchronous recognizer limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Largest payload accepted inline.
    #[serde(default = "default_sync_max_bytes")]
    pub max_bytes: u64,
    /// Longest audio accepted inline.
    #[serde(default = "default_sync_max_duration")]
    pub max_duration_secs: u32,
}

impl Default for SyncTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: default_sync_max_bytes(),
            max_duration_secs: default_sync_max_duration(),
        }
    }
}

/// Long-running recognizer polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongRunningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Hard cap on total wait before `transcription_timeout`.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    /// Constant used for elapsed-time progress estimates.
    #[serde(default = "default_estimated_duration")]
    pub estimated_duration_secs: u64,
}

impl Default for LongRunningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval(),
            max_wait_secs: default_max_wait(),
            estimated_duration_secs: default_estimated_duration(),
        }
    }
}

impl LongRunningConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs(self.estimated_duration_secs.max(1))
    }
}

/// Speech recognition API used by the sync and long-running tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechApiConfig {
    #[serde(default = "default_speech_base")]
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// OAuth access token, used when no API key is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_language")]
    pub language_code: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
}

impl Default for SpeechApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_speech_base(),
            api_key: None,
            access_token: None,
            timeout_secs: default_speech_timeout(),
            language_code: default_language(),
            sample_rate_hz: default_sample_rate(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_model() -> String {
    "whisper-1".to_string()
}

fn default_batch_timeout() -> u64 {
    300
}

fn default_sync_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_sync_max_duration() -> u32 {
    60
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_max_wait() -> u64 {
    600
}

fn default_estimated_duration() -> u64 {
    120
}

fn default_speech_base() -> String {
    "https://speech.googleapis.com/v1".to_string()
}

fn default_speech_timeout() -> u64 {
    60
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}
