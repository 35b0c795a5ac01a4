//! API request handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::core::job::JobSpec;
use crate::core::schedule::Schedule;
use crate::core::types::JobId;
use crate::scheduler::ScheduleEngine;
use crate::storage::{HistoryRecorder, JobStore};

use super::errors::ApiError;
use super::responses::{
    CancelResponse, HealthResponse, HistoryListResponse, JobListResponse, JobResponse,
    RecordResponse,
};

/// Shared application state for API handlers.
pub struct ApiState<S> {
    pub engine: ScheduleEngine<S>,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S> ApiState<S> {
    pub fn new(engine: ScheduleEngine<S>) -> Self {
        Self { engine }
    }
}

/// Request body for creating a job.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub target: String,
    pub payload: String,
    pub schedule: Schedule,
}

/// Request body for replacing a job's schedule.
#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub schedule: Schedule,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Query parameters for the failures endpoint.
#[derive(Debug, Deserialize)]
pub struct FailuresQuery {
    /// Window size in hours, counted back from now.
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_hours() -> i64 {
    24
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw).map_err(|_| ApiError::BadRequest(format!("invalid job id: {}", raw)))
}

/// Health check endpoint.
pub async fn health<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let since = Utc::now() - Duration::hours(default_hours());
    let recent_failures = state.engine.recent_failures(since).await?.len();
    Ok(Json(HealthResponse::new(
        state.engine.armed_count(),
        recent_failures,
    )))
}

/// List all jobs.
pub async fn list_jobs<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs: Vec<JobResponse> = state
        .engine
        .list_jobs()
        .await?
        .into_iter()
        .map(JobResponse::from)
        .collect();
    let count = jobs.len();
    Ok(Json(JobListResponse { jobs, count }))
}

/// Create and arm a new job.
pub async fn create_job<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    if request.target.is_empty() {
        return Err(ApiError::BadRequest("target must not be empty".to_string()));
    }

    let job = state
        .engine
        .add_job(JobSpec {
            target: request.target,
            payload: request.payload,
            schedule: request.schedule,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(JobResponse::from(job))))
}

/// Get a specific job.
pub async fn get_job<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.engine.get_job(&job_id).await?;
    Ok(Json(JobResponse::from(job)))
}

/// Cancel a job.
pub async fn cancel_job<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let cancelled = state.engine.cancel_job(&job_id).await?;

    let message = if cancelled {
        format!("job {} cancelled", job_id)
    } else {
        format!("job {} was already inactive", job_id)
    };
    Ok(Json(CancelResponse {
        job_id: job_id.to_string(),
        cancelled,
        message,
    }))
}

/// Replace a job's schedule.
pub async fn reschedule_job<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
    Path(job_id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let job = state
        .engine
        .reschedule_job(&job_id, request.schedule)
        .await?;
    Ok(Json(JobResponse::from(job)))
}

/// List failed deliveries across all jobs within a recent window.
pub async fn list_failures<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
    Query(query): Query<FailuresQuery>,
) -> Result<Json<HistoryListResponse>, ApiError> {
    let since = Utc::now() - Duration::hours(query.hours);
    let records: Vec<RecordResponse> = state
        .engine
        .recent_failures(since)
        .await?
        .into_iter()
        .map(RecordResponse::from)
        .collect();
    let count = records.len();
    Ok(Json(HistoryListResponse { records, count }))
}

/// List execution history for a job.
pub async fn list_history<S: JobStore + HistoryRecorder + 'static>(
    State(state): State<ApiState<S>>,
    Path(job_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryListResponse>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let records: Vec<RecordResponse> = state
        .engine
        .history(&job_id, query.limit)
        .await?
        .into_iter()
        .map(RecordResponse::from)
        .collect();
    let count = records.len();
    Ok(Json(HistoryListResponse { records, count }))
}
