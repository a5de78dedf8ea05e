//! Upload configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where finished documents go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadBackend {
    /// A directory on local disk.
    #[default]
    Local,
    /// Google Drive via its REST API.
    Drive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub backend: UploadBackend,
    /// Largest rendered document accepted for upload.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default)]
    pub local: LocalUploadConfig,
    #[serde(default)]
    pub drive: DriveConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            backend: UploadBackend::default(),
            max_bytes: default_max_bytes(),
            local: LocalUploadConfig::default(),
            drive: DriveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUploadConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Prefix for links to uploaded files; `file://` paths when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for LocalUploadConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,
    /// Parent folder or shared drive for uploaded files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_drive_id: Option<String>,
    /// Token used when a submission carries no bearer token of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_token: Option<String>,
    /// Grant anyone-with-the-link read access.
    #[serde(default = "default_true")]
    pub public_link: bool,
    #[serde(default = "default_drive_timeout")]
    pub timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: default_drive_api_base(),
            shared_drive_id: None,
            service_token: None,
            public_link: true,
            timeout_secs: default_drive_timeout(),
        }
    }
}

fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("briefsmith-output")
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_drive_timeout() -> u64 {
    120
}
