//! Core domain types: identifiers, schedules, and the job model.

pub mod job;
pub mod schedule;
pub mod types;

pub use job::{Job, JobSpec};
pub use schedule::{Schedule, ScheduleError, ScheduleKind};
pub use types::{JobId, RecordId};
