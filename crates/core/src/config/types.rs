use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::generate::{GenerationConfig, LlmProvider};
use crate::pipeline::PipelineConfig;
use crate::storage::StagingBackend;
use crate::transcribe::TranscriptionConfig;
use crate::upload::{UploadBackend, UploadConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub transcription: SanitizedTranscriptionConfig,
    pub generation: SanitizedGenerationConfig,
    pub upload: SanitizedUploadConfig,
}

/// Transcription tiers with credentials hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTranscriptionConfig {
    pub batch_enabled: bool,
    pub batch_configured: bool,
    pub batch_model: String,
    pub sync_enabled: bool,
    pub sync_max_bytes: u64,
    pub sync_max_duration_secs: u32,
    pub long_running_enabled: bool,
    pub poll_interval_ms: u64,
    pub max_wait_secs: u64,
    pub speech_credentials_configured: bool,
    pub staging_backend: String,
}

/// Generation config with the API key hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGenerationConfig {
    pub provider: String,
    pub models: Vec<String>,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub max_tokens: u32,
}

/// Upload config with tokens hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUploadConfig {
    pub backend: String,
    pub max_bytes: u64,
    pub drive_service_token_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_shared_drive_id: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let t = &config.transcription;
        let g = &config.generation;
        let u = &config.upload;
        Self {
            server: config.server.clone(),
            pipeline: config.pipeline.clone(),
            transcription: SanitizedTranscriptionConfig {
                batch_enabled: t.batch.enabled,
                batch_configured: t.batch.api_base.is_some(),
                batch_model: t.batch.model.clone(),
                sync_enabled: t.sync.enabled,
                sync_max_bytes: t.sync.max_bytes,
                sync_max_duration_secs: t.sync.max_duration_secs,
                long_running_enabled: t.long_running.enabled,
                poll_interval_ms: t.long_running.poll_interval_ms,
                max_wait_secs: t.long_running.max_wait_secs,
                speech_credentials_configured: t.speech.api_key.is_some()
                    || t.speech.access_token.is_some(),
                staging_backend: match t.staging.backend {
                    StagingBackend::Local => "local".to_string(),
                    StagingBackend::Gcs => "gcs".to_string(),
                },
            },
            generation: SanitizedGenerationConfig {
                provider: match g.provider {
                    LlmProvider::Anthropic => "anthropic".to_string(),
                    LlmProvider::Ollama => "ollama".to_string(),
                },
                models: g.models.clone(),
                api_key_configured: g.api_key.as_ref().is_some_and(|k| !k.is_empty()),
                api_base: g.api_base.clone(),
                max_tokens: g.max_tokens,
            },
            upload: SanitizedUploadConfig {
                backend: match u.backend {
                    UploadBackend::Local => "local".to_string(),
                    UploadBackend::Drive => "drive".to_string(),
                },
                max_bytes: u.max_bytes,
                drive_service_token_configured: u.drive.service_token.is_some(),
                drive_shared_drive_id: u.drive.shared_drive_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.pipeline.windows.extract.lower(), 5);
        assert_eq!(config.pipeline.windows.upload.upper(), 100);
        assert_eq!(config.transcription.long_running.poll_interval_ms, 2000);
        assert_eq!(config.transcription.sync.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload.backend, UploadBackend::Local);
    }

    #[test]
    fn test_deserialize_full_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[pipeline]
max_input_bytes = 2048

[pipeline.windows]
intake = [0, 10]
extract = [10, 50]
generate = [50, 95]
upload = [95, 100]

[transcription.batch]
api_base = "http://whisper.local"
model = "large-v3"

[transcription.staging]
backend = "gcs"
bucket = "briefs-staging"

[generation]
provider = "ollama"
models = ["llama3"]

[upload]
backend = "drive"

[upload.drive]
shared_drive_id = "0AAbc"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pipeline.max_input_bytes, 2048);
        assert_eq!(config.pipeline.windows.generate.upper(), 95);
        assert_eq!(config.transcription.batch.model, "large-v3");
        assert_eq!(config.transcription.staging.backend, StagingBackend::Gcs);
        assert_eq!(config.generation.provider, LlmProvider::Ollama);
        assert_eq!(config.upload.backend, UploadBackend::Drive);
        assert_eq!(config.upload.drive.shared_drive_id.as_deref(), Some("0AAbc"));
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[transcription.speech]
api_key = "speech-secret"

[generation]
api_key = "llm-secret"

[upload.drive]
service_token = "drive-secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.generation.api_key_configured);
        assert!(sanitized.transcription.speech_credentials_configured);
        assert!(sanitized.upload.drive_service_token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }
}
