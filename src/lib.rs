//! courier - scheduled message delivery engine.
//!
//! Jobs carry an opaque target and payload plus a schedule (a single UTC
//! instant or a cron cadence). The engine persists jobs, keeps one live
//! trigger per active job, delivers payloads through a pluggable
//! dispatcher, and appends an execution record for every firing. On
//! restart the trigger registry is rebuilt from the stored active jobs.

pub mod api;
pub mod core;
pub mod dispatch;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use crate::core::job::{Job, JobSpec};
pub use crate::core::schedule::{Schedule, ScheduleError, ScheduleKind};
pub use crate::core::types::{JobId, RecordId};
pub use crate::dispatch::{DeliveryError, Dispatcher, Receipt, WebhookDispatcher};
pub use crate::scheduler::{EngineError, ScheduleEngine};
pub use crate::storage::{
    ExecutionRecord, HistoryRecorder, InMemoryStore, JobStore, JobUpdate, StorageError,
};
#[cfg(any(feature = "sqlite", test))]
pub use crate::storage::SqliteStore;
