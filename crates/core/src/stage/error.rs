//! Error taxonomy shared by every stage.
//!
//! Each failure is classified at the point it is produced. The fallback
//! chain only ever looks at the [`ErrorKind`] and [`Disposition`], never at
//! the message text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classified failure codes surfaced to job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The declared content type is not one we can process.
    UnsupportedType,
    /// Text could not be extracted from a document.
    ExtractionError,
    /// Input is larger than a size limit.
    SizeExceeded,
    /// Audio is longer than a duration limit.
    DurationExceeded,
    /// Recognition returned no speech.
    NoSpeechDetected,
    /// Transport failure or remote 5xx.
    ConnectionError,
    /// Credentials were rejected.
    PermissionDenied,
    /// Rate limit or quota hit.
    QuotaExceeded,
    /// Long-running transcription exceeded its wall-clock cap.
    TranscriptionTimeout,
    /// Every tier of a fallback chain failed.
    AllTiersExhausted,
    /// Content generation failed.
    GenerationError,
    /// Remote upload failed.
    UploadError,
    /// Upload needs credentials the caller did not provide.
    AuthRequired,
    /// A tier's backing service is not configured or not reachable.
    ServiceUnavailable,
    /// The requested model does not exist or is not accessible.
    ModelUnavailable,
    /// Transcription failed for a reason not covered above.
    TranscriptionFailed,
    /// The remote service rejected the input as malformed.
    InvalidInput,
    /// Local failure inside the pipeline itself (temp dirs, joins).
    Internal,
}

impl ErrorKind {
    /// Stable snake_case code used in job status payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType => "unsupported_type",
            Self::ExtractionError => "extraction_error",
            Self::SizeExceeded => "size_exceeded",
            Self::DurationExceeded => "duration_exceeded",
            Self::NoSpeechDetected => "no_speech_detected",
            Self::ConnectionError => "connection_error",
            Self::PermissionDenied => "permission_denied",
            Self::QuotaExceeded => "quota_exceeded",
            Self::TranscriptionTimeout => "transcription_timeout",
            Self::AllTiersExhausted => "all_tiers_exhausted",
            Self::GenerationError => "generation_error",
            Self::UploadError => "upload_error",
            Self::AuthRequired => "auth_required",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ModelUnavailable => "model_unavailable",
            Self::TranscriptionFailed => "transcription_failed",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        }
    }

    /// Disposition used when the producer does not pick one explicitly.
    pub fn default_disposition(&self) -> Disposition {
        match self {
            Self::ConnectionError
            | Self::QuotaExceeded
            | Self::DurationExceeded
            | Self::ServiceUnavailable
            | Self::ModelUnavailable
            | Self::GenerationError => Disposition::Advance,
            Self::UnsupportedType
            | Self::ExtractionError
            | Self::SizeExceeded
            | Self::NoSpeechDetected
            | Self::PermissionDenied
            | Self::TranscriptionTimeout
            | Self::AllTiersExhausted
            | Self::UploadError
            | Self::AuthRequired
            | Self::TranscriptionFailed
            | Self::InvalidInput
            | Self::Internal => Disposition::Abort,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether a failure lets a fallback chain move on to its next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Another tier may succeed where this one failed.
    Advance,
    /// The condition applies to every remaining tier.
    Abort,
}

/// A classified stage failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct StageError {
    kind: ErrorKind,
    disposition: Disposition,
    message: String,
    cause: Option<Box<StageError>>,
}

impl StageError {
    /// Creates an error with the kind's default disposition.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            disposition: kind.default_disposition(),
            message: message.into(),
            cause: None,
        }
    }

    /// Creates an error that lets the chain try the next tier, whatever the kind.
    ///
    /// Used for limits that only apply to the producing tier, such as the
    /// synchronous recognizer's payload cap.
    pub fn tier_local(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Advance,
            ..Self::new(kind, message)
        }
    }

    /// Creates an error that stops the chain, whatever the kind.
    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Abort,
            ..Self::new(kind, message)
        }
    }

    /// Wraps the last tier failure once a chain has run out of tiers.
    pub fn exhausted(stage: &str, last: StageError) -> Self {
        Self {
            kind: ErrorKind::AllTiersExhausted,
            disposition: Disposition::Abort,
            message: format!("all {} tiers failed, last error: {}", stage, last),
            cause: Some(Box::new(last)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped failure for [`ErrorKind::AllTiersExhausted`].
    pub fn cause(&self) -> Option<&StageError> {
        self.cause.as_deref()
    }

    /// Innermost classified failure.
    pub fn root_cause(&self) -> &StageError {
        match &self.cause {
            Some(inner) => inner.root_cause(),
            None => self,
        }
    }

    pub fn is_advancing(&self) -> bool {
        self.disposition == Disposition::Advance
    }

    /// Classifies an HTTP status returned by a remote service.
    ///
    /// `fallback` is used for statuses without a dedicated kind.
    pub fn from_http_status(status: u16, fallback: ErrorKind, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::ServiceUnavailable,
            408 | 500..=599 => ErrorKind::ConnectionError,
            429 => ErrorKind::QuotaExceeded,
            _ => fallback,
        };
        Self::new(kind, message)
    }

    /// Classifies a transport-level reqwest failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self::new(ErrorKind::ConnectionError, format!("request failed: {}", err))
    }
}

/// Result type produced by every stage.
pub type StageOutcome<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dispositions() {
        assert!(StageError::new(ErrorKind::ConnectionError, "x").is_advancing());
        assert!(StageError::new(ErrorKind::DurationExceeded, "x").is_advancing());
        assert!(!StageError::new(ErrorKind::PermissionDenied, "x").is_advancing());
        assert!(!StageError::new(ErrorKind::AuthRequired, "x").is_advancing());
        assert!(!StageError::new(ErrorKind::SizeExceeded, "x").is_advancing());
    }

    #[test]
    fn test_tier_local_overrides_kind() {
        let err = StageError::tier_local(ErrorKind::SizeExceeded, "sync payload cap");
        assert_eq!(err.kind(), ErrorKind::SizeExceeded);
        assert!(err.is_advancing());

        let err = StageError::fatal(ErrorKind::ConnectionError, "gone");
        assert!(!err.is_advancing());
    }

    #[test]
    fn test_exhausted_keeps_last_cause() {
        let last = StageError::new(ErrorKind::QuotaExceeded, "slow down");
        let err = StageError::exhausted("transcription", last);
        assert_eq!(err.kind(), ErrorKind::AllTiersExhausted);
        assert_eq!(err.root_cause().kind(), ErrorKind::QuotaExceeded);
        assert!(err.message().contains("slow down"));
    }

    #[test]
    fn test_http_status_classification() {
        let fallback = ErrorKind::UploadError;
        assert_eq!(
            StageError::from_http_status(403, fallback, "").kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            StageError::from_http_status(429, fallback, "").kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            StageError::from_http_status(503, fallback, "").kind(),
            ErrorKind::ConnectionError
        );
        assert_eq!(StageError::from_http_status(400, fallback, "").kind(), fallback);
    }

    #[test]
    fn test_error_display() {
        let err = StageError::new(ErrorKind::UnsupportedType, "'.exe' is not supported");
        assert_eq!(err.to_string(), "unsupported_type: '.exe' is not supported");
    }
}
