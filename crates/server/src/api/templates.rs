//! Per-user template section lists.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use briefsmith_core::template::{normalize_sections, sections_from_docx};

use super::jobs::ErrorResponse;
use crate::state::AppState;

/// Request body for storing a template
#[derive(Debug, Deserialize)]
pub struct TemplateBody {
    pub sections: Vec<String>,
}

/// A user's stored section list
#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub user: String,
    pub sections: Vec<String>,
}

/// Store the section list of a user's template
pub async fn put_template(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(body): Json<TemplateBody>,
) -> Result<Json<TemplateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let sections = normalize_sections(body.sections);
    if sections.is_empty() {
        return Err(bad_request("sections must name at least one section"));
    }

    info!(user = %user, count = sections.len(), "Stored template");
    state.templates().store(&user, sections.clone()).await;
    Ok(Json(TemplateResponse { user, sections }))
}

fn bad_request(error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
            code: None,
        }),
    )
}

/// Store a user's template from the headings of an uploaded DOCX
pub async fn upload_template_document(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<TemplateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let read_error = |e: axum::extract::multipart::MultipartError| {
        (
            e.status(),
            Json(ErrorResponse {
                error: format!("Failed to read upload: {}", e),
                code: None,
            }),
        )
    };

    let mut document = None;
    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() == Some("file") {
            document = Some(field.bytes().await.map_err(read_error)?);
        } else {
            warn!(field = ?field.name(), "Ignoring unknown form field");
        }
    }
    let document = document.ok_or_else(|| bad_request("Missing 'file' part"))?;

    let sections = sections_from_docx(&document).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.message().to_string(),
                code: Some(e.kind()),
            }),
        )
    })?;

    info!(user = %user, count = sections.len(), "Stored template from document");
    state.templates().store(&user, sections.clone()).await;
    Ok(Json(TemplateResponse { user, sections }))
}

/// Get the section list of a user's template
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<TemplateResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.templates().sections(&user).await {
        Some(sections) => Ok(Json(TemplateResponse { user, sections })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No template for user: {}", user),
                code: None,
            }),
        )),
    }
}
