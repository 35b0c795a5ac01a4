//! Scheduling engine: trigger registry, firing orchestration, and the
//! mutation surface (add, cancel, reschedule).

mod engine;
mod registry;

pub use engine::{EngineError, ScheduleEngine};
pub use registry::{FireFn, FireFuture, TriggerRegistry};
