//! Generation configuration types.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Claude API.
    #[default]
    Anthropic,
    /// Local Ollama instance.
    Ollama,
}

/// Content generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Models tried in order; a model that is missing or inaccessible
    /// hands over to the next one.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum tokens for the combined all-sections call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Maximum tokens for each per-section call.
    #[serde(default = "default_section_max_tokens")]
    pub section_max_tokens: u32,
    /// Source text beyond this many characters is cut before prompting.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            models: default_models(),
            api_key: None,
            api_base: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            section_max_tokens: default_section_max_tokens(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_models() -> Vec<String> {
    vec![
        "claude-sonnet-4-5".to_string(),
        "claude-3-5-haiku-latest".to_string(),
    ]
}

fn default_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_section_max_tokens() -> u32 {
    1024
}

fn default_max_input_chars() -> usize {
    100_000
}
