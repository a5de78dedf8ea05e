//! Speech recognition API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::config::SpeechApiConfig;
use crate::metrics;
use crate::stage::{ErrorKind, StageError, StageOutcome};

/// Recognition parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: String,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    pub enable_automatic_punctuation: bool,
}

/// Audio passed inline or by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionAudio {
    /// Base64 encoded bytes.
    Content(String),
    /// Object store URI.
    Uri(String),
}

/// State of a long-running recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Running { progress_percent: Option<u8> },
    /// Finished; one transcript per recognized segment.
    Done(Vec<String>),
}

/// Speech recognition service.
#[async_trait]
pub trait SpeechApi: Send + Sync {
    /// Synchronous recognition; returns one transcript per segment.
    async fn recognize(
        &self,
        config: &RecognitionConfig,
        audio: RecognitionAudio,
    ) -> StageOutcome<Vec<String>>;

    /// Starts a long-running recognition and returns the operation name.
    async fn start_long_running(
        &self,
        config: &RecognitionConfig,
        uri: &str,
    ) -> StageOutcome<String>;

    async fn poll_operation(&self, name: &str) -> StageOutcome<OperationStatus>;
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: &'a RecognitionConfig,
    audio: AudioBody,
}

#[derive(Debug, Serialize)]
struct AudioBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

impl From<RecognitionAudio> for AudioBody {
    fn from(audio: RecognitionAudio) -> Self {
        match audio {
            RecognitionAudio::Content(c) => Self {
                content: Some(c),
                uri: None,
            },
            RecognitionAudio::Uri(u) => Self {
                content: None,
                uri: Some(u),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
}

impl RecognizeResponse {
    fn transcripts(self) -> Vec<String> {
        self.results
            .into_iter()
            .filter_map(|r| r.alternatives.into_iter().next())
            .map(|a| a.transcript.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OperationName {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    response: Option<RecognizeResponse>,
    #[serde(default)]
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationMetadata {
    #[serde(default)]
    progress_percent: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiStatus,
}

/// Google API error status.
#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Classifies a Google API error by its canonical status, then HTTP code.
pub fn classify_api_status(http_status: u16, api: &ApiStatus) -> StageError {
    let message = if api.message.is_empty() {
        format!("speech API returned {}", http_status)
    } else {
        api.message.clone()
    };
    let kind = match api.status.as_deref() {
        Some("PERMISSION_DENIED") | Some("UNAUTHENTICATED") => ErrorKind::PermissionDenied,
        Some("RESOURCE_EXHAUSTED") => ErrorKind::QuotaExceeded,
        Some("UNAVAILABLE") | Some("DEADLINE_EXCEEDED") | Some("INTERNAL") => {
            ErrorKind::ConnectionError
        }
        Some("INVALID_ARGUMENT") => ErrorKind::InvalidInput,
        _ => {
            let code = if api.code != 0 { api.code } else { http_status };
            return StageError::from_http_status(code, ErrorKind::TranscriptionFailed, message);
        }
    };
    StageError::new(kind, message)
}

/// REST client for the Google Cloud Speech-to-Text v1 API.
pub struct GoogleSpeechClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl GoogleSpeechClient {
    pub fn new(config: &SpeechApiConfig) -> StageOutcome<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::fatal(ErrorKind::ServiceUnavailable, e.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> StageOutcome<reqwest::RequestBuilder> {
        match (&self.api_key, &self.access_token) {
            (Some(key), _) => Ok(request.query(&[("key", key)])),
            (None, Some(token)) => Ok(request.bearer_auth(token)),
            (None, None) => Err(StageError::new(
                ErrorKind::PermissionDenied,
                "no speech API credentials configured",
            )),
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> StageOutcome<T> {
        let started = Instant::now();
        let response = self.authorize(request)?.send().await.map_err(|e| {
            let elapsed = started.elapsed().as_secs_f64();
            metrics::record_external_call("speech", operation, elapsed, false);
            StageError::from_transport(&e)
        })?;

        let status = response.status().as_u16();
        let ok = response.status().is_success();
        metrics::record_external_call("speech", operation, started.elapsed().as_secs_f64(), ok);

        if !ok {
            let body = response.text().await.unwrap_or_default();
            let api = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error)
                .unwrap_or(ApiStatus {
                    code: status,
                    message: body,
                    status: None,
                });
            return Err(classify_api_status(status, &api));
        }

        response.json::<T>().await.map_err(|e| {
            StageError::new(
                ErrorKind::TranscriptionFailed,
                format!("invalid speech API response: {}", e),
            )
        })
    }
}

#[async_trait]
impl SpeechApi for GoogleSpeechClient {
    async fn recognize(
        &self,
        config: &RecognitionConfig,
        audio: RecognitionAudio,
    ) -> StageOutcome<Vec<String>> {
        let body = RecognizeRequest {
            config,
            audio: audio.into(),
        };
        let request = self
            .client
            .post(format!("{}/speech:recognize", self.api_base))
            .json(&body);
        let response: RecognizeResponse = self.send("recognize", request).await?;
        Ok(response.transcripts())
    }

    async fn start_long_running(
        &self,
        config: &RecognitionConfig,
        uri: &str,
    ) -> StageOutcome<String> {
        let body = RecognizeRequest {
            config,
            audio: RecognitionAudio::Uri(uri.to_string()).into(),
        };
        let request = self
            .client
            .post(format!("{}/speech:longrunningrecognize", self.api_base))
            .json(&body);
        let op: OperationName = self.send("long_running_recognize", request).await?;
        debug!(operation = %op.name, "Submitted long-running recognition");
        Ok(op.name)
    }

    async fn poll_operation(&self, name: &str) -> StageOutcome<OperationStatus> {
        let request = self
            .client
            .get(format!("{}/operations/{}", self.api_base, name));
        let op: Operation = self.send("get_operation", request).await?;
        operation_status(op)
    }
}

fn operation_status(op: Operation) -> StageOutcome<OperationStatus> {
    if let Some(err) = op.error {
        return Err(classify_api_status(err.code, &err));
    }
    if !op.done {
        return Ok(OperationStatus::Running {
            progress_percent: op.metadata.and_then(|m| m.progress_percent),
        });
    }
    Ok(OperationStatus::Done(
        op.response.unwrap_or_default().transcripts(),
    ))
}
