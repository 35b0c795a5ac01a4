//! Storage abstraction for persisting jobs and execution history.
//!
//! This module provides a trait-based storage abstraction with
//! pluggable backends (in-memory, SQLite, etc.). Jobs are the mutable
//! source of truth reconstructed on startup; execution history is an
//! append-only audit trail that is never rewritten.

mod memory;
#[cfg(any(feature = "sqlite", test))]
mod sqlite;

pub use memory::InMemoryStore;
#[cfg(any(feature = "sqlite", test))]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::job::Job;
use crate::core::schedule::Schedule;
use crate::core::types::{JobId, RecordId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate key was detected.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// One firing attempt, recorded whether delivery succeeded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique record identifier.
    pub id: RecordId,
    /// The job that fired.
    pub job_id: JobId,
    /// Delivery target at the time of firing.
    pub target: String,
    /// When the firing started.
    pub executed_at: DateTime<Utc>,
    /// Whether delivery succeeded.
    pub success: bool,
    /// Delivery error message (if failed).
    pub error: Option<String>,
    /// Downstream message identifier (if the dispatcher returned one).
    pub receipt_id: Option<String>,
}

impl ExecutionRecord {
    /// Record a successful delivery.
    pub fn success(job: &Job, executed_at: DateTime<Utc>, receipt_id: Option<String>) -> Self {
        Self {
            id: RecordId::new(),
            job_id: job.id.clone(),
            target: job.target.clone(),
            executed_at,
            success: true,
            error: None,
            receipt_id,
        }
    }

    /// Record a failed delivery.
    pub fn failure(job: &Job, executed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            job_id: job.id.clone(),
            target: job.target.clone(),
            executed_at,
            success: false,
            error: Some(error.into()),
            receipt_id: None,
        }
    }
}

/// A partial update to a stored job. Unset fields are left unchanged;
/// `updated_at` is stamped by the store on every apply.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub schedule: Option<Schedule>,
    pub active: Option<bool>,
    pub last_executed: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Set the last-executed timestamp.
    pub fn with_last_executed(mut self, at: DateTime<Utc>) -> Self {
        self.last_executed = Some(at);
        self
    }

    /// Apply this update to a job in place.
    pub fn apply(self, job: &mut Job) {
        if let Some(schedule) = self.schedule {
            job.schedule = schedule;
        }
        if let Some(active) = self.active {
            job.active = active;
        }
        if let Some(last_executed) = self.last_executed {
            job.last_executed = Some(last_executed);
        }
        job.updated_at = Utc::now();
    }
}

/// Storage trait for the job table.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn insert_job(&self, job: Job) -> Result<(), StorageError>;

    /// Get a job by ID.
    async fn get_job(&self, id: &JobId) -> Result<Job, StorageError>;

    /// List all jobs, ordered by creation time.
    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError>;

    /// List jobs with the active flag set, ordered by creation time.
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StorageError>;

    /// Apply a partial update to a job, returning the updated row.
    async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<Job, StorageError>;
}

/// Storage trait for the append-only execution history.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Append an execution record.
    async fn append(&self, record: ExecutionRecord) -> Result<(), StorageError>;

    /// List records for a job, most recent first. Returns at most
    /// `limit` records.
    async fn list_for_job(
        &self,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StorageError>;

    /// List failed records across all jobs since the given instant, most
    /// recent first. This is the monitoring channel: failures are never
    /// pushed, they are discovered here.
    async fn list_failures(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StorageError>;
}
