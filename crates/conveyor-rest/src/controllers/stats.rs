//! Aggregate statistics.

use axum::extract::State;
use axum::Json;

use conveyor_jobs::{JobMetrics, JobState};

use crate::dto::StatsResponse;
use crate::responses::ApiResult;
use crate::state::AppState;

/// `GET /stats` — counts by state plus the live queue depth.
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let counts = state.store.stats().await?;
    let queue_depth = state.queue.depth(&state.queue_name).await?;

    JobMetrics::queue_depth(&state.queue_name, queue_depth);
    JobMetrics::dlq_size(counts.get(JobState::Dlq));

    Ok(Json(StatsResponse {
        total: counts.total,
        pending: counts.get(JobState::Pending),
        in_progress: counts.get(JobState::InProgress),
        completed: counts.get(JobState::Completed),
        failed: counts.get(JobState::Failed),
        retrying: counts.get(JobState::Retrying),
        dlq: counts.get(JobState::Dlq),
        dead: counts.get(JobState::Dead),
        queue_depth,
    }))
}
