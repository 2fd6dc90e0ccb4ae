//! Job submission, status, listing, and manual transitions.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use conveyor_core::{CoreError, Page, PageRequest};
use conveyor_jobs::{JobError, JobFilter, JobId, JobMetrics, JobState};

use crate::dto::{JobStatusResponse, ReasonRequest, SubmitJobRequest, SubmitJobResponse};
use crate::responses::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /jobs` — submit a job.
///
/// 202 with the new id on first acceptance; 200 with the existing id on an
/// idempotent replay of the same `(queue, idempotencyKey)`.
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let traceparent = headers
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let new_job = req.into_new_job(&state.queue_name, traceparent)?;
    let queue_name = new_job.queue_name.clone();
    let idempotency_key = new_job.idempotency_key.clone();
    let job_id = JobId::from_string(Uuid::new_v4().to_string());

    match state.store.insert_job(job_id.clone(), new_job).await {
        Ok(()) => {}
        Err(JobError::Conflict { .. }) => {
            let existing = state
                .store
                .get_job_by_idempotency_key(&queue_name, &idempotency_key)
                .await?
                .ok_or_else(|| {
                    ApiError(CoreError::internal("conflicting job disappeared mid-lookup"))
                })?;
            return Ok((
                StatusCode::OK,
                Json(SubmitJobResponse {
                    job_id: existing.job_id.to_string(),
                }),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    state.queue.enqueue(&queue_name, &job_id).await?;
    JobMetrics::enqueued(&queue_name);
    info!(job_id = %job_id, queue = %queue_name, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job_id.to_string(),
        }),
    ))
}

/// Query parameters for the job listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsParams {
    pub state: Option<String>,
    pub job_type: Option<String>,
    pub queue: Option<String>,
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /jobs` — filtered, paginated listing.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<Page<JobStatusResponse>>> {
    let state_filter = params
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<JobState>()
                .map_err(|e| ApiError(CoreError::validation(e)))
        })
        .transpose()?;

    let filter = JobFilter {
        queue_name: params.queue.filter(|s| !s.is_empty()),
        state: state_filter,
        job_type: params.job_type.filter(|s| !s.is_empty()),
        search: params.q.filter(|s| !s.is_empty()),
    };
    let page = PageRequest::from_params(params.limit, params.offset);

    let (items, total) = state.store.query_jobs(&filter, page).await?;
    Ok(Json(Page::new(items, total, page).map(JobStatusResponse::from)))
}

/// `GET /jobs/{id}` — full job row.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state
        .store
        .get_job(&JobId::from_string(&job_id))
        .await?
        .ok_or_else(|| ApiError(CoreError::not_found("job", &job_id)))?;
    Ok(Json(job.into()))
}

/// `POST /jobs/{id}/retry` — manual retry, then re-enqueue.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = JobId::from_string(job_id);
    state.store.retry_job(&job_id).await?;
    state.queue.enqueue(&state.queue_name, &job_id).await?;
    JobMetrics::enqueued(&state.queue_name);
    info!(job_id = %job_id, "Manual retry accepted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /jobs/{id}/cancel` — manual cancel into the DLQ.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<StatusCode> {
    let mut reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    reason = reason.trim().to_string();
    if reason.is_empty() {
        reason = "canceled".to_string();
    }

    let job_id = JobId::from_string(job_id);
    state.store.dlq_job(&job_id, &reason).await?;
    JobMetrics::dead_lettered(&state.queue_name, "canceled");
    info!(job_id = %job_id, reason = %reason, "Job canceled into DLQ");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /jobs/{id}/dlq` — manual dead-letter with an explicit reason.
pub async fn dlq_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> ApiResult<StatusCode> {
    let reason = body
        .map(|Json(b)| b.reason.trim().to_string())
        .unwrap_or_default();

    let job_id = JobId::from_string(job_id);
    state.store.dlq_job(&job_id, &reason).await?;
    JobMetrics::dead_lettered(&state.queue_name, "manual");
    info!(job_id = %job_id, "Job dead-lettered manually");
    Ok(StatusCode::NO_CONTENT)
}
