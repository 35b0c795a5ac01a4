//! The scheduling engine.
//!
//! The engine owns the trigger registry and ties it to the store and the
//! dispatcher. All job mutations go through it so the registry and the
//! stored rows never drift apart:
//!
//! - adding a job persists it, then arms a trigger
//! - cancelling disarms first, then deactivates the row
//! - rescheduling disarms, rewrites the schedule, and re-arms
//!
//! On startup [`ScheduleEngine::start`] rebuilds the registry from the
//! active rows before the engine is handed out, so no mutation can race
//! reconciliation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::registry::{FireFn, TriggerRegistry};
use crate::core::job::{Job, JobSpec};
use crate::core::schedule::{Schedule, ScheduleError, ScheduleKind};
use crate::core::types::JobId;
use crate::dispatch::Dispatcher;
use crate::storage::{
    ExecutionRecord, HistoryRecorder, JobStore, JobUpdate, StorageError,
};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The supplied schedule cannot be armed.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

fn not_found_as_job(e: StorageError, id: &JobId) -> EngineError {
    match e {
        StorageError::NotFound(_) => EngineError::JobNotFound(id.to_string()),
        other => EngineError::Storage(other),
    }
}

struct EngineInner<S> {
    store: Arc<S>,
    dispatcher: Arc<dyn Dispatcher>,
    registry: Arc<TriggerRegistry>,
}

impl<S> EngineInner<S>
where
    S: JobStore + HistoryRecorder + 'static,
{
    /// Execute one firing of a job: deliver, append the execution record,
    /// then update the job row. The record is written before the row so a
    /// crash between the two loses bookkeeping, never audit history.
    /// Failures here are logged, not propagated; the outcome is visible
    /// through the history.
    async fn fire(&self, job: &Job) {
        let executed_at = Utc::now();
        info!(job_id = %job.id, target = %job.target, "firing job");

        let outcome = self.dispatcher.deliver(&job.target, &job.payload).await;

        let record = match &outcome {
            Ok(receipt) => {
                info!(job_id = %job.id, receipt_id = ?receipt.id, "delivery succeeded");
                ExecutionRecord::success(job, executed_at, receipt.id.clone())
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e.reason, "delivery failed");
                ExecutionRecord::failure(job, executed_at, e.reason.clone())
            }
        };

        if let Err(e) = self.store.append(record).await {
            warn!(job_id = %job.id, error = %e, "failed to append execution record");
        }

        let mut update = JobUpdate::new().with_last_executed(executed_at);
        if job.schedule.kind() == ScheduleKind::OneTime {
            // One-time jobs retire after their single attempt, delivered
            // or not.
            update = update.with_active(false);
        }
        if let Err(e) = self.store.update_job(&job.id, update).await {
            warn!(job_id = %job.id, error = %e, "failed to update job after firing");
        }
    }
}

/// Scheduling and dispatch engine.
///
/// Cheap to clone; clones share the same registry and store.
pub struct ScheduleEngine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for ScheduleEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> ScheduleEngine<S>
where
    S: JobStore + HistoryRecorder + 'static,
{
    /// Create an engine without reconciling. Prefer [`ScheduleEngine::start`].
    pub fn new(store: Arc<S>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                dispatcher,
                registry: Arc::new(TriggerRegistry::new()),
            }),
        }
    }

    /// Create an engine and rebuild triggers from the stored active jobs.
    ///
    /// Overdue one-time jobs fire immediately; recurring jobs resume from
    /// their next occurrence, missed ticks are not replayed. A stored job
    /// whose schedule no longer parses is logged and skipped, it does not
    /// block the rest.
    pub async fn start(
        store: Arc<S>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, EngineError> {
        let engine = Self::new(store, dispatcher);
        engine.reconcile().await?;
        Ok(engine)
    }

    /// Rebuild the trigger registry from the stored active jobs.
    /// Returns how many triggers were armed.
    pub async fn reconcile(&self) -> Result<usize, EngineError> {
        let jobs = self.inner.store.list_active_jobs().await?;
        let mut armed = 0;

        for job in jobs {
            match self.arm(&job) {
                Ok(()) => armed += 1,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "skipping job with invalid stored schedule");
                }
            }
        }

        info!(count = armed, "reconciled scheduled jobs");
        Ok(armed)
    }

    /// Validate, persist, and arm a new job.
    ///
    /// A one-time instant that has already elapsed is accepted and fires
    /// immediately, the same way an overdue job does at reconcile.
    pub async fn add_job(&self, spec: JobSpec) -> Result<Job, EngineError> {
        spec.schedule.ensure_parsable()?;

        let job = Job::from_spec(spec);
        self.inner.store.insert_job(job.clone()).await?;
        self.arm(&job)?;

        info!(job_id = %job.id, kind = %job.schedule.kind(), "job added");
        Ok(job)
    }

    /// Cancel a job: disarm its trigger and deactivate the stored row.
    ///
    /// Returns `true` if the job was active, `false` if it had already
    /// fired or been cancelled. Unknown ids are an error. History is
    /// kept either way, and a firing already in flight completes and is
    /// still recorded.
    pub async fn cancel_job(&self, id: &JobId) -> Result<bool, EngineError> {
        self.inner.registry.disarm(id);

        let job = self
            .inner
            .store
            .get_job(id)
            .await
            .map_err(|e| not_found_as_job(e, id))?;

        if !job.active {
            return Ok(false);
        }

        self.inner
            .store
            .update_job(id, JobUpdate::new().with_active(false))
            .await
            .map_err(|e| not_found_as_job(e, id))?;

        info!(job_id = %id, "job cancelled");
        Ok(true)
    }

    /// Replace a job's schedule and re-arm it.
    ///
    /// Works on inactive jobs too: rescheduling reactivates them. The old
    /// trigger is disarmed before anything is written, so the job never
    /// briefly has two triggers.
    pub async fn reschedule_job(
        &self,
        id: &JobId,
        schedule: Schedule,
    ) -> Result<Job, EngineError> {
        schedule.ensure_parsable()?;

        self.inner.registry.disarm(id);

        let job = self
            .inner
            .store
            .update_job(
                id,
                JobUpdate::new().with_schedule(schedule).with_active(true),
            )
            .await
            .map_err(|e| not_found_as_job(e, id))?;

        self.arm(&job)?;

        info!(job_id = %id, kind = %job.schedule.kind(), "job rescheduled");
        Ok(job)
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &JobId) -> Result<Job, EngineError> {
        self.inner
            .store
            .get_job(id)
            .await
            .map_err(|e| not_found_as_job(e, id))
    }

    /// List all jobs, active and retired.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, EngineError> {
        Ok(self.inner.store.list_jobs().await?)
    }

    /// List only the jobs that should currently have a trigger.
    pub async fn list_active_jobs(&self) -> Result<Vec<Job>, EngineError> {
        Ok(self.inner.store.list_active_jobs().await?)
    }

    /// Snapshot of the armed triggers and their schedule kinds.
    pub fn armed_jobs(&self) -> Vec<(JobId, ScheduleKind)> {
        self.inner.registry.armed()
    }

    /// Execution history for a job, most recent first.
    pub async fn history(
        &self,
        id: &JobId,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        // Distinguish an unknown job from one that has never fired.
        self.get_job(id).await?;
        Ok(self.inner.store.list_for_job(id, limit).await?)
    }

    /// Failed executions across all jobs since the given instant, most
    /// recent first.
    pub async fn recent_failures(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        Ok(self.inner.store.list_failures(since).await?)
    }

    /// Number of currently armed triggers.
    pub fn armed_count(&self) -> usize {
        self.inner.registry.armed_count()
    }

    /// Whether a job currently has a live trigger.
    pub fn is_armed(&self, id: &JobId) -> bool {
        self.inner.registry.is_armed(id)
    }

    /// Abort all triggers. Firings already in flight still complete.
    pub fn shutdown(&self) {
        self.inner.registry.clear();
        info!("engine shut down");
    }

    fn arm(&self, job: &Job) -> Result<(), ScheduleError> {
        let inner = Arc::clone(&self.inner);
        let snapshot = Arc::new(job.clone());
        let fire: FireFn = Arc::new(move || {
            let inner = Arc::clone(&inner);
            let job = Arc::clone(&snapshot);
            Box::pin(async move {
                inner.fire(&job).await;
            })
        });

        self.inner
            .registry
            .arm(job.id.clone(), job.schedule.clone(), fire)
    }
}
