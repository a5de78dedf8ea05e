//! Recently generated documents at the upload destination.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use briefsmith_core::upload::RemoteDocument;
use briefsmith_core::ErrorKind;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::jobs::ErrorResponse;
use super::middleware::CallerAuth;
use crate::state::AppState;

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RecentDocumentsResponse {
    pub days: u32,
    pub documents: Vec<RemoteDocument>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AuthRequired => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// List documents generated in the last `days` days, newest first
pub async fn recent_documents(
    State(state): State<Arc<AppState>>,
    CallerAuth(auth): CallerAuth,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentDocumentsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let days = query.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);
    let since = Utc::now() - Duration::days(i64::from(days));

    match state.driver().recent_documents(since, &auth).await {
        Ok(documents) => Ok(Json(RecentDocumentsResponse { days, documents })),
        Err(e) => Err((
            status_for(e.kind()),
            Json(ErrorResponse {
                error: e.message().to_string(),
                code: Some(e.kind()),
            }),
        )),
    }
}
