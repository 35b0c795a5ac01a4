//! The scheduled job model.

use crate::core::schedule::Schedule;
use crate::core::types::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled delivery job as held in the store.
///
/// `active` marks whether the job should have a live trigger: one-time jobs
/// flip inactive after they fire, cancelled jobs flip inactive and keep their
/// history. `last_executed` records the start instant of the most recent
/// firing attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Where the payload is delivered (a webhook URL for the default
    /// dispatcher; opaque to the engine).
    pub target: String,
    /// The message content to deliver, opaque to the engine.
    pub payload: String,
    pub schedule: Schedule,
    pub active: bool,
    pub last_executed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Materialize a job from a creation request, stamping identity and
    /// timestamps. The schedule is assumed already validated.
    pub fn from_spec(spec: JobSpec) -> Self {
        let now = Utc::now();
        Job {
            id: JobId::new(),
            target: spec.target,
            payload: spec.payload,
            schedule: spec.schedule,
            active: true,
            last_executed: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What a caller supplies when creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub target: String,
    pub payload: String,
    pub schedule: Schedule,
}
