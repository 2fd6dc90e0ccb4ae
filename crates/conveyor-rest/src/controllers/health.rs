//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::state::AppState;

/// `GET /healthz` — process liveness.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `GET /readyz` — store and queue reachability.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("store not ready: {}", e),
        );
    }
    if let Err(e) = state.queue.ping().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("queue not ready: {}", e),
        );
    }
    (StatusCode::OK, "ok".to_string())
}
