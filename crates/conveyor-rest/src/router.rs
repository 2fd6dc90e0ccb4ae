//! Router assembly.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::controllers::{dlq, health, jobs, stats};
use crate::state::AppState;

/// Maximum accepted request body: 1 MiB.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Builds the control-plane router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/jobs", post(jobs::submit_job).get(jobs::list_jobs))
        .route("/jobs/:job_id", get(jobs::get_job))
        .route("/jobs/:job_id/retry", post(jobs::retry_job))
        .route("/jobs/:job_id/cancel", post(jobs::cancel_job))
        .route("/jobs/:job_id/dlq", post(jobs::dlq_job))
        .route("/dlq", get(dlq::list_dlq))
        .route("/dlq/:job_id", get(dlq::inspect_dlq))
        .route("/dlq/:job_id/replay", post(dlq::replay_dlq))
        .route("/stats", get(stats::stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
