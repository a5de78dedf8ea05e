//! Detection of supported input kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::stage::{ErrorKind, StageError};

/// Text-bearing document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
    Markdown,
}

/// Audio formats accepted for transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioKind {
    Wav,
    Mp3,
    M4a,
    Flac,
    Ogg,
}

impl AudioKind {
    /// Encoding name used by the speech recognition API.
    pub fn speech_encoding(&self) -> &'static str {
        match self {
            AudioKind::Wav => "LINEAR16",
            AudioKind::Mp3 | AudioKind::M4a => "MP3",
            AudioKind::Flac => "FLAC",
            AudioKind::Ogg => "OGG_OPUS",
        }
    }
}

/// What a submitted file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", content = "format", rename_all = "snake_case")]
pub enum SourceKind {
    Document(DocumentKind),
    Audio(AudioKind),
}

impl SourceKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let kind = match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Self::Document(DocumentKind::Pdf),
            "docx" => Self::Document(DocumentKind::Docx),
            "txt" => Self::Document(DocumentKind::Text),
            "md" | "markdown" => Self::Document(DocumentKind::Markdown),
            "wav" => Self::Audio(AudioKind::Wav),
            "mp3" => Self::Audio(AudioKind::Mp3),
            "m4a" => Self::Audio(AudioKind::M4a),
            "flac" => Self::Audio(AudioKind::Flac),
            "ogg" | "opus" => Self::Audio(AudioKind::Ogg),
            _ => return None,
        };
        Some(kind)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        let kind = match essence.as_str() {
            "application/pdf" => Self::Document(DocumentKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Document(DocumentKind::Docx)
            }
            "text/plain" => Self::Document(DocumentKind::Text),
            "text/markdown" => Self::Document(DocumentKind::Markdown),
            "audio/wav" | "audio/x-wav" | "audio/wave" => Self::Audio(AudioKind::Wav),
            "audio/mpeg" | "audio/mp3" => Self::Audio(AudioKind::Mp3),
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Self::Audio(AudioKind::M4a),
            "audio/flac" | "audio/x-flac" => Self::Audio(AudioKind::Flac),
            "audio/ogg" | "audio/opus" => Self::Audio(AudioKind::Ogg),
            _ => return None,
        };
        Some(kind)
    }

    /// Detects the kind from the file name's extension, falling back to the
    /// declared content type.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Result<Self, StageError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Self::from_extension(ext)
            .or_else(|| content_type.and_then(Self::from_mime))
            .ok_or_else(|| {
                let shown = if ext.is_empty() {
                    content_type.unwrap_or("unknown").to_string()
                } else {
                    format!(".{}", ext)
                };
                StageError::new(
                    ErrorKind::UnsupportedType,
                    format!("unsupported file type: {}", shown),
                )
            })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Document(DocumentKind::Pdf) => "pdf",
            Self::Document(DocumentKind::Docx) => "docx",
            Self::Document(DocumentKind::Text) => "txt",
            Self::Document(DocumentKind::Markdown) => "md",
            Self::Audio(AudioKind::Wav) => "wav",
            Self::Audio(AudioKind::Mp3) => "mp3",
            Self::Audio(AudioKind::M4a) => "m4a",
            Self::Audio(AudioKind::Flac) => "flac",
            Self::Audio(AudioKind::Ogg) => "ogg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Document(DocumentKind::Pdf) => "application/pdf",
            Self::Document(DocumentKind::Docx) => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Document(DocumentKind::Text) => "text/plain",
            Self::Document(DocumentKind::Markdown) => "text/markdown",
            Self::Audio(AudioKind::Wav) => "audio/wav",
            Self::Audio(AudioKind::Mp3) => "audio/mpeg",
            Self::Audio(AudioKind::M4a) => "audio/mp4",
            Self::Audio(AudioKind::Flac) => "audio/flac",
            Self::Audio(AudioKind::Ogg) => "audio/ogg",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            SourceKind::detect("RFP.PDF", None).unwrap(),
            SourceKind::Document(DocumentKind::Pdf)
        );
        assert_eq!(
            SourceKind::detect("call.m4a", Some("application/octet-stream")).unwrap(),
            SourceKind::Audio(AudioKind::M4a)
        );
    }

    #[test]
    fn test_detect_falls_back_to_mime() {
        assert_eq!(
            SourceKind::detect("upload", Some("audio/x-wav")).unwrap(),
            SourceKind::Audio(AudioKind::Wav)
        );
        assert_eq!(
            SourceKind::detect("notes", Some("text/plain; charset=utf-8")).unwrap(),
            SourceKind::Document(DocumentKind::Text)
        );
    }

    #[test]
    fn test_detect_unsupported() {
        let err = SourceKind::detect("setup.exe", Some("application/x-msdownload")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert!(err.message().contains(".exe"));
        assert!(!err.is_advancing());
    }

    #[test]
    fn test_speech_encoding() {
        assert_eq!(AudioKind::Wav.speech_encoding(), "LINEAR16");
        assert_eq!(AudioKind::M4a.speech_encoding(), "MP3");
    }
}
