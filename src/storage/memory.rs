//! In-memory storage implementation.
//!
//! Provides a thread-safe in-memory backend for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{ExecutionRecord, HistoryRecorder, JobStore, JobUpdate, StorageError};
use crate::core::job::Job;
use crate::core::types::JobId;

/// In-memory storage backend.
///
/// Thread-safe storage using RwLock for concurrent access.
/// Data is not persisted across restarts.
pub struct InMemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    history: RwLock<Vec<ExecutionRecord>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn insert_job(&self, job: Job) -> Result<(), StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StorageError::DuplicateKey(format!("job: {}", job.id)));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("job: {}", id)))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = jobs.values().cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = jobs.values().filter(|j| j.active).cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<Job, StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("job: {}", id)))?;
        update.apply(job);
        Ok(job.clone())
    }
}

#[async_trait]
impl HistoryRecorder for InMemoryStore {
    async fn append(&self, record: ExecutionRecord) -> Result<(), StorageError> {
        let mut history = self
            .history
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        history.push(record);
        Ok(())
    }

    async fn list_for_job(
        &self,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let history = self
            .history
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = history
            .iter()
            .filter(|r| &r.job_id == job_id)
            .cloned()
            .collect();
        // Most recent first.
        result.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_failures(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let history = self
            .history
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = history
            .iter()
            .filter(|r| !r.success && r.executed_at >= since)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(result)
    }
}
