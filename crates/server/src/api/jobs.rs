//! Job submission and status handlers.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use briefsmith_core::intake::JobSource;
use briefsmith_core::{ErrorKind, Job, JobId, JobInput, PipelineError};

use super::middleware::CallerAuth;
use crate::metrics::SUBMISSIONS_REJECTED;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for an accepted submission
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorKind>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, reason: &str, error: impl Into<String>) -> ApiError {
    SUBMISSIONS_REJECTED.with_label_values(&[reason]).inc();
    (status, Json(ErrorResponse::new(error)))
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    let reason = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "too_large"
    } else {
        "malformed"
    };
    reject(status, reason, format!("Failed to read upload: {}", e))
}

/// The parts of a submission form.
struct SubmissionForm {
    file: Vec<u8>,
    file_name: String,
    content_type: Option<String>,
    sections: Option<Vec<String>>,
}

async fn read_form(mut multipart: Multipart) -> Result<SubmissionForm, ApiError> {
    let mut file: Option<(Vec<u8>, String, Option<String>)> = None;
    let mut sections: Option<Vec<String>> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((bytes.to_vec(), file_name, content_type));
            }
            "sections" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    let parsed: Vec<String> = serde_json::from_str(&text).map_err(|e| {
                        reject(
                            StatusCode::BAD_REQUEST,
                            "bad_sections",
                            format!("sections must be a JSON array of strings: {}", e),
                        )
                    })?;
                    sections = Some(parsed);
                }
            }
            other => {
                warn!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    let (file, file_name, content_type) = file.ok_or_else(|| {
        reject(StatusCode::BAD_REQUEST, "missing_file", "Missing 'file' part")
    })?;
    if file_name.trim().is_empty() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "missing_file",
            "The 'file' part needs a file name",
        ));
    }

    Ok(SubmissionForm {
        file,
        file_name,
        content_type,
        sections,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a file and start a job for it
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    CallerAuth(auth): CallerAuth,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let form = read_form(multipart).await?;
    let size = form.file.len() as u64;

    let mut input = JobInput::new(JobSource::from_bytes(form.file), form.file_name)
        .with_size_hint(size)
        .with_auth(auth);
    if let Some(content_type) = form.content_type {
        input = input.with_content_type(content_type);
    }
    if let Some(sections) = form.sections {
        input = input.with_sections(sections);
    }

    match state.driver().submit(input).await {
        Ok(job_id) => {
            info!(job_id = %job_id, size, "Accepted submission");
            Ok((
                StatusCode::ACCEPTED,
                Json(SubmitJobResponse {
                    job_id: job_id.to_string(),
                }),
            ))
        }
        Err(PipelineError::Rejected(e)) => {
            SUBMISSIONS_REJECTED.with_label_values(&[e.kind().code()]).inc();
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.message().to_string(),
                    code: Some(e.kind()),
                }),
            ))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )),
    }
}

/// Get a job snapshot by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Job not found: {}", id))),
        )
    };

    let job_id = JobId::from_str(&id).map_err(|_| not_found())?;

    match state.driver().status(&job_id).await {
        Ok(job) => Ok(Json(job)),
        Err(PipelineError::NotFound(_)) => Err(not_found()),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )),
    }
}
