//! Dead-letter queue inspection and replay.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use conveyor_core::{CoreError, Page, PageRequest};
use conveyor_jobs::{JobId, JobMetrics};

use crate::dto::{DlqEntryResponse, DlqInspectResponse, JobStatusResponse};
use crate::responses::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for the DLQ listing.
#[derive(Debug, Deserialize)]
pub struct ListDlqParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /dlq` — paginated DLQ entries, newest first.
pub async fn list_dlq(
    State(state): State<AppState>,
    Query(params): Query<ListDlqParams>,
) -> ApiResult<Json<Page<DlqEntryResponse>>> {
    let page = PageRequest::from_params(params.limit, params.offset);
    let (entries, total) = state.store.list_dlq(page).await?;
    Ok(Json(Page::new(entries, total, page).map(DlqEntryResponse::from)))
}

/// `GET /dlq/{id}` — one entry with the embedded job.
pub async fn inspect_dlq(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DlqInspectResponse>> {
    let id = JobId::from_string(&job_id);
    let entry = state
        .store
        .get_dlq_entry(&id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found("dlq_entry", &job_id)))?;
    let job = state
        .store
        .get_job(&id)
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found("job", &job_id)))?;
    Ok(Json(DlqInspectResponse {
        entry: entry.into(),
        job: JobStatusResponse::from(job),
    }))
}

/// `POST /dlq/{id}/replay` — atomic replay, then re-enqueue.
pub async fn replay_dlq(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = JobId::from_string(&job_id);
    state.store.replay_dlq(&id).await?;
    state.queue.enqueue(&state.queue_name, &id).await?;
    JobMetrics::replayed(&state.queue_name);
    JobMetrics::enqueued(&state.queue_name);
    info!(job_id = %id, "DLQ entry replayed");
    Ok(StatusCode::NO_CONTENT)
}
