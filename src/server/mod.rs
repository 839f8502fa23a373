//! HTTP transport over the run controller.

mod events;
mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::orchestrator::RunController;

pub fn router(controller: RunController) -> Router {
    Router::new()
        // Route used by existing scanner clients.
        .route("/advance/{camera}/{count}", get(handlers::advance_handler))
        .route("/runs", post(handlers::start_run_handler))
        .route("/abort", post(handlers::abort_handler))
        .route("/reverse", post(handlers::reverse_handler))
        .route("/status", get(handlers::status_handler))
        .route("/events", get(events::progress_sse_handler))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}
