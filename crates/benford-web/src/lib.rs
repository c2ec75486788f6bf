//! HTTP front end: document upload, job listing, and results polling.
//!
//! Uploaded documents are handed to a [`dispatch::WorkerPool`] by data key;
//! the handlers themselves never run an analysis.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

pub mod dispatch;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::AppState;

/// Base64 inflates documents by a third; allow 64 MB PDFs.
const MAX_BODY_BYTES: usize = 90 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", get(handlers::listing::users))
        .route("/jobs", get(handlers::listing::jobs))
        .route("/reset", delete(handlers::reset::reset))
        .route("/pdf/{userid}/{jobtype}", post(handlers::upload::upload))
        .route("/results/{jobid}", get(handlers::results::results))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
