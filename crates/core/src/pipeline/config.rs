//! Configuration for the pipeline driver.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::stage::ProgressWindow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root for per-job temp directories.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Largest accepted input file.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,

    /// Optional markdown template the renderer fills in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_template: Option<PathBuf>,

    /// Prefix of uploaded document names.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    #[serde(default)]
    pub windows: StageWindows,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_input_bytes: default_max_input_bytes(),
            base_template: None,
            output_prefix: default_output_prefix(),
            windows: StageWindows::default(),
        }
    }
}

/// Progress windows of the stages, in execution order.
///
/// Extraction and transcription share the `extract` window, since a job runs
/// exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWindows {
    #[serde(default = "default_intake")]
    pub intake: ProgressWindow,
    #[serde(default = "default_extract")]
    pub extract: ProgressWindow,
    #[serde(default = "default_generate")]
    pub generate: ProgressWindow,
    #[serde(default = "default_upload")]
    pub upload: ProgressWindow,
}

impl Default for StageWindows {
    fn default() -> Self {
        Self {
            intake: default_intake(),
            extract: default_extract(),
            generate: default_generate(),
            upload: default_upload(),
        }
    }
}

impl StageWindows {
    /// Windows with their config keys, in execution order.
    pub fn ordered(&self) -> [(&'static str, ProgressWindow); 4] {
        [
            ("intake", self.intake),
            ("extract", self.extract),
            ("generate", self.generate),
            ("upload", self.upload),
        ]
    }
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("briefsmith")
}

fn default_max_input_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_output_prefix() -> String {
    "Brief".to_string()
}

fn default_intake() -> ProgressWindow {
    ProgressWindow::fixed(0, 5)
}

fn default_extract() -> ProgressWindow {
    ProgressWindow::fixed(5, 40)
}

fn default_generate() -> ProgressWindow {
    ProgressWindow::fixed(40, 90)
}

fn default_upload() -> ProgressWindow {
    ProgressWindow::fixed(90, 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows_are_consecutive() {
        let ordered = StageWindows::default().ordered();
        assert_eq!(ordered[0].1.lower(), 0);
        assert_eq!(ordered[3].1.upper(), 100);
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].1.upper(), pair[1].1.lower());
        }
    }
}
