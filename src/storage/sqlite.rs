//! SQLite storage implementation.
//!
//! Provides persistent storage using SQLite database. Timestamps are
//! stored as RFC 3339 UTC strings, schedules as JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{ExecutionRecord, HistoryRecorder, JobStore, JobUpdate, StorageError};
use crate::core::job::Job;
use crate::core::schedule::Schedule;
use crate::core::types::{JobId, RecordId};

/// SQLite storage backend.
///
/// Provides persistent storage with automatic schema migration.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given database path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// Helper functions for column conversion

fn datetime_to_string(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("invalid timestamp: {}", e)))
}

fn schedule_to_json(schedule: &Schedule) -> Result<String, StorageError> {
    serde_json::to_string(schedule).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn json_to_schedule(json: &str) -> Result<Schedule, StorageError> {
    serde_json::from_str(json).map_err(|e| StorageError::SerializationError(e.to_string()))
}

type JobRow = (
    String,         // id
    String,         // target
    String,         // payload
    String,         // schedule (JSON)
    bool,           // active
    Option<String>, // last_executed
    String,         // created_at
    String,         // updated_at
);

fn row_to_job(row: JobRow) -> Result<Job, StorageError> {
    Ok(Job {
        id: JobId::parse(&row.0)
            .map_err(|e| StorageError::SerializationError(format!("invalid uuid: {}", e)))?,
        target: row.1,
        payload: row.2,
        schedule: json_to_schedule(&row.3)?,
        active: row.4,
        last_executed: row.5.as_deref().map(string_to_datetime).transpose()?,
        created_at: string_to_datetime(&row.6)?,
        updated_at: string_to_datetime(&row.7)?,
    })
}

type RecordRow = (
    String,         // id
    String,         // job_id
    String,         // target
    String,         // executed_at
    bool,           // success
    Option<String>, // error
    Option<String>, // receipt_id
);

fn row_to_record(row: RecordRow) -> Result<ExecutionRecord, StorageError> {
    Ok(ExecutionRecord {
        id: RecordId::parse(&row.0)
            .map_err(|e| StorageError::SerializationError(format!("invalid uuid: {}", e)))?,
        job_id: JobId::parse(&row.1)
            .map_err(|e| StorageError::SerializationError(format!("invalid uuid: {}", e)))?,
        target: row.2,
        executed_at: string_to_datetime(&row.3)?,
        success: row.4,
        error: row.5,
        receipt_id: row.6,
    })
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert_job(&self, job: Job) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, target, payload, schedule, active, last_executed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.target)
        .bind(&job.payload)
        .bind(schedule_to_json(&job.schedule)?)
        .bind(job.active)
        .bind(job.last_executed.map(datetime_to_string))
        .bind(datetime_to_string(job.created_at))
        .bind(datetime_to_string(job.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateKey(format!("job: {}", job.id)))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StorageError> {
        let row: JobRow = sqlx::query_as(
            "SELECT id, target, payload, schedule, active, last_executed, created_at, updated_at FROM jobs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("job: {}", id)))?;

        row_to_job(row)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT id, target, payload, schedule, active, last_executed, created_at, updated_at FROM jobs ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter().map(row_to_job).collect()
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT id, target, payload, schedule, active, last_executed, created_at, updated_at FROM jobs WHERE active = 1 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter().map(row_to_job).collect()
    }

    async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<Job, StorageError> {
        let mut job = self.get_job(id).await?;
        update.apply(&mut job);

        let result = sqlx::query(
            r#"
            UPDATE jobs SET schedule = ?, active = ?, last_executed = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(schedule_to_json(&job.schedule)?)
        .bind(job.active)
        .bind(job.last_executed.map(datetime_to_string))
        .bind(datetime_to_string(job.updated_at))
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("job: {}", id)));
        }
        Ok(job)
    }
}

#[async_trait]
impl HistoryRecorder for SqliteStore {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO execution_history (id, job_id, target, executed_at, success, error, receipt_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.job_id.to_string())
        .bind(&record.target)
        .bind(datetime_to_string(record.executed_at))
        .bind(record.success)
        .bind(&record.error)
        .bind(&record.receipt_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateKey(format!("record: {}", record.id)))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn list_for_job(
        &self,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT id, job_id, target, executed_at, success, error, receipt_id FROM execution_history WHERE job_id = ? ORDER BY executed_at DESC LIMIT ?",
        )
        .bind(job_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn list_failures(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT id, job_id, target, executed_at, success, error, receipt_id FROM execution_history WHERE success = 0 AND executed_at >= ? ORDER BY executed_at DESC",
        )
        .bind(datetime_to_string(since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter().map(row_to_record).collect()
    }
}
