//! In-memory trigger registry.
//!
//! Each active job owns at most one trigger task. A trigger sleeps until
//! the job's next occurrence, spawns the firing as a detached task, and
//! waits for it to finish before arming the next occurrence, so firings
//! for a single job never overlap. Aborting a trigger never cancels a
//! firing already in flight.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::schedule::{Schedule, ScheduleError, ScheduleKind};
use crate::core::types::JobId;

/// Boxed firing future produced by a [`FireFn`].
pub type FireFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback invoked for each occurrence of an armed job.
pub type FireFn = Arc<dyn Fn() -> FireFuture + Send + Sync>;

/// Generation marker for a trigger. A finishing trigger may only remove
/// its own registry entry; a stale token means the job was re-armed in
/// the meantime and the newer trigger must be left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TriggerToken(u64);

struct TriggerEntry {
    token: TriggerToken,
    kind: ScheduleKind,
    handle: JoinHandle<()>,
}

/// Maps job ids to their live trigger tasks.
///
/// The mutex is only held for map operations, never across an await.
pub struct TriggerRegistry {
    entries: Mutex<HashMap<JobId, TriggerEntry>>,
    next_token: AtomicU64,
}

impl TriggerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, TriggerEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Arm a trigger for a job, replacing (and aborting) any existing one.
    ///
    /// A one-time schedule whose instant has already passed fires
    /// immediately. Fails without spawning anything if the schedule is
    /// malformed.
    pub fn arm(
        self: &Arc<Self>,
        id: JobId,
        schedule: Schedule,
        fire: FireFn,
    ) -> Result<(), ScheduleError> {
        schedule.ensure_parsable()?;

        let token = TriggerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let kind = schedule.kind();
        let registry = Arc::downgrade(self);
        let trigger_id = id.clone();

        // Hold the lock across the spawn so the trigger cannot observe the
        // registry before its own entry is inserted.
        let mut entries = self.lock();
        let handle = tokio::spawn(async move {
            run_trigger(trigger_id, schedule, fire, token, registry).await;
        });
        if let Some(old) = entries.insert(id.clone(), TriggerEntry { token, kind, handle }) {
            old.handle.abort();
            debug!(job_id = %id, "replaced existing trigger");
        }
        Ok(())
    }

    /// Remove and abort a job's trigger. Returns whether one existed.
    ///
    /// A firing already dispatched keeps running to completion; only the
    /// trigger loop is cancelled.
    pub fn disarm(&self, id: &JobId) -> bool {
        match self.lock().remove(id) {
            Some(entry) => {
                entry.handle.abort();
                debug!(job_id = %id, "trigger disarmed");
                true
            }
            None => false,
        }
    }

    /// Whether a job currently has a live trigger.
    pub fn is_armed(&self, id: &JobId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of armed triggers.
    pub fn armed_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the armed triggers and their schedule kinds.
    pub fn armed(&self) -> Vec<(JobId, ScheduleKind)> {
        self.lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.kind))
            .collect()
    }

    /// Abort every trigger. Used at shutdown.
    pub fn clear(&self) {
        let mut entries = self.lock();
        for (_, entry) in entries.drain() {
            entry.handle.abort();
        }
    }

    /// Self-removal path for a trigger that has run out of occurrences.
    /// No-op when the entry now belongs to a newer trigger.
    fn complete(&self, id: &JobId, token: TriggerToken) {
        let mut entries = self.lock();
        if entries.get(id).map(|e| e.token) == Some(token) {
            entries.remove(id);
        }
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_trigger(
    id: JobId,
    schedule: Schedule,
    fire: FireFn,
    token: TriggerToken,
    registry: Weak<TriggerRegistry>,
) {
    match schedule {
        Schedule::OneTime { at } => {
            sleep_until(at).await;
            dispatch_firing(&id, &fire).await;
        }
        schedule @ Schedule::Recurring { .. } => loop {
            let next = match schedule.next_after(Utc::now()) {
                Ok(next) => next,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "schedule has no further occurrences");
                    break;
                }
            };
            sleep_until(next).await;
            dispatch_firing(&id, &fire).await;
        },
    }

    if let Some(registry) = registry.upgrade() {
        registry.complete(&id, token);
    }
}

/// Spawn the firing detached and wait for it. Detaching means an abort of
/// this trigger cannot cancel the delivery mid-flight; waiting means the
/// next occurrence is not armed until this one finishes.
async fn dispatch_firing(id: &JobId, fire: &FireFn) {
    let firing = tokio::spawn(fire());
    if let Err(e) = firing.await {
        if e.is_panic() {
            warn!(job_id = %id, "firing task panicked");
        }
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
