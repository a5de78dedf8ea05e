use super::{types::Config, ConfigError};
use crate::storage::StagingBackend;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Stage windows are increasing, non-overlapping and end at 100
/// - Size caps, poll interval and wait cap are not 0
/// - At least one generation model and one transcription tier
/// - GCS staging names a bucket
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    // Pipeline validation
    let pipeline = &config.pipeline;
    if pipeline.max_input_bytes == 0 {
        return Err(invalid("pipeline.max_input_bytes cannot be 0"));
    }
    let windows = pipeline.windows.ordered();
    for pair in windows.windows(2) {
        let ((a_name, a), (b_name, b)) = (pair[0], pair[1]);
        if a.upper() > b.lower() {
            return Err(invalid(format!(
                "pipeline.windows.{} {} overlaps pipeline.windows.{} {}",
                a_name, a, b_name, b
            )));
        }
    }
    if pipeline.windows.upload.upper() != 100 {
        return Err(invalid("pipeline.windows.upload must end at 100"));
    }

    // Transcription validation
    let t = &config.transcription;
    if !(t.batch.enabled || t.sync.enabled || t.long_running.enabled) {
        return Err(invalid("at least one transcription tier must be enabled"));
    }
    if t.sync.max_bytes == 0 {
        return Err(invalid("transcription.sync.max_bytes cannot be 0"));
    }
    if t.long_running.poll_interval_ms == 0 {
        return Err(invalid(
            "transcription.long_running.poll_interval_ms cannot be 0",
        ));
    }
    if t.long_running.max_wait_secs == 0 {
        return Err(invalid("transcription.long_running.max_wait_secs cannot be 0"));
    }
    if t.staging.backend == StagingBackend::Gcs && t.staging.bucket.is_none() {
        return Err(invalid(
            "transcription.staging.bucket is required for the gcs backend",
        ));
    }

    // Generation validation
    if config.generation.models.iter().all(|m| m.trim().is_empty()) {
        return Err(invalid("generation.models must name at least one model"));
    }

    // Upload validation
    if config.upload.max_bytes == 0 {
        return Err(invalid("upload.max_bytes cannot be 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ProgressWindow;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_overlapping_windows_fail() {
        let mut config = Config::default();
        config.pipeline.windows.generate = ProgressWindow::new(30, 90).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_validate_last_window_must_end_at_100() {
        let mut config = Config::default();
        config.pipeline.windows.upload = ProgressWindow::new(90, 99).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_models_fail() {
        let mut config = Config::default();
        config.generation.models.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_poll_interval_fails() {
        let mut config = Config::default();
        config.transcription.long_running.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_gcs_requires_bucket() {
        let mut config = Config::default();
        config.transcription.staging.backend = StagingBackend::Gcs;
        assert!(validate_config(&config).is_err());
        config.transcription.staging.bucket = Some("b".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
