use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{documents, handlers, jobs, middleware::metrics_middleware, templates};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_request_bytes();

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Jobs
        .route(
            "/jobs",
            post(jobs::submit_job).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/jobs/{id}", get(jobs::get_job))
        // Templates
        .route(
            "/templates/{user}",
            get(templates::get_template).put(templates::put_template),
        )
        .route(
            "/templates/{user}/document",
            post(templates::upload_template_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        // Generated documents
        .route("/documents/recent", get(documents::recent_documents));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
