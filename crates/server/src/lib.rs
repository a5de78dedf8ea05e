//! HTTP surface for the briefsmith pipeline.

pub mod api;
pub mod metrics;
pub mod services;
pub mod state;

pub use api::create_router;
pub use services::{build_services, build_state};
pub use state::AppState;
