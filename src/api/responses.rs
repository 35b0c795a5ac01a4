//! API response types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::job::Job;
use crate::core::schedule::{Schedule, ScheduleKind};
use crate::storage::ExecutionRecord;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub armed_triggers: usize,
    /// Failed deliveries in the last 24 hours.
    pub recent_failures: usize,
}

impl HealthResponse {
    pub fn new(armed_triggers: usize, recent_failures: usize) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            armed_triggers,
            recent_failures,
        }
    }
}

/// Job detail for list and get responses.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub target: String,
    pub payload: String,
    pub schedule: Schedule,
    pub kind: ScheduleKind,
    pub active: bool,
    pub last_executed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            kind: job.schedule.kind(),
            target: job.target,
            payload: job.payload,
            schedule: job.schedule,
            active: job.active,
            last_executed: job.last_executed,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// List of jobs response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub count: usize,
}

/// Cancellation response.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
    pub message: String,
}

/// One execution record.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: String,
    pub job_id: String,
    pub target: String,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub receipt_id: Option<String>,
}

impl From<ExecutionRecord> for RecordResponse {
    fn from(record: ExecutionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            job_id: record.job_id.to_string(),
            target: record.target,
            executed_at: record.executed_at,
            success: record.success,
            error: record.error,
            receipt_id: record.receipt_id,
        }
    }
}

/// Execution history response.
#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub records: Vec<RecordResponse>,
    pub count: usize,
}
