//! Delivery lifecycle integration tests.
//!
//! End-to-end runs of the engine against the in-memory store with a
//! recording dispatcher standing in for the webhook transport.

use courier::testing::RecordingDispatcher;
use courier::{InMemoryStore, JobSpec, Schedule, ScheduleEngine};

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{wait_for_records, wait_until_inactive};

async fn start_engine() -> (
    ScheduleEngine<InMemoryStore>,
    Arc<InMemoryStore>,
    Arc<RecordingDispatcher>,
) {
    let store = Arc::new(InMemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let engine = ScheduleEngine::start(Arc::clone(&store), dispatcher.clone())
        .await
        .unwrap();
    (engine, store, dispatcher)
}

/// Test: a one-time job delivers its payload, gets a success record with
/// a receipt, and retires.
#[tokio::test]
async fn test_one_time_delivery_lifecycle() {
    let (engine, store, dispatcher) = start_engine().await;

    let job = engine
        .add_job(JobSpec {
            target: "https://example.com/announcements".to_string(),
            payload: "release is out".to_string(),
            schedule: Schedule::one_time(Utc::now() + ChronoDuration::milliseconds(200)),
        })
        .await
        .unwrap();

    let records = wait_for_records(store.as_ref(), &job.id, 1, Duration::from_secs(5)).await;
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert!(records[0].receipt_id.is_some());
    assert_eq!(records[0].target, "https://example.com/announcements");

    let retired = wait_until_inactive(store.as_ref(), &job.id, Duration::from_secs(5)).await;
    assert!(retired.last_executed.is_some());
    assert!(!engine.is_armed(&job.id));

    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payload, "release is out");
}

/// Test: a recurring job keeps firing and accumulating history, most
/// recent first.
#[tokio::test]
async fn test_recurring_delivery_accumulates_history() {
    let (engine, store, _dispatcher) = start_engine().await;

    let job = engine
        .add_job(JobSpec {
            target: "https://example.com/hook".to_string(),
            payload: "tick".to_string(),
            // Every second.
            schedule: Schedule::recurring("* * * * * *"),
        })
        .await
        .unwrap();

    let records = wait_for_records(store.as_ref(), &job.id, 2, Duration::from_secs(5)).await;
    assert!(records.len() >= 2);
    assert!(records[0].executed_at >= records[1].executed_at);
    assert!(records.iter().all(|r| r.success));

    // Still live after firing.
    let current = engine.get_job(&job.id).await.unwrap();
    assert!(current.active);
    assert!(engine.is_armed(&job.id));
}

/// Test: a failed delivery is recorded with its error and the recurring
/// cadence carries on, succeeding once the target recovers.
#[tokio::test]
async fn test_failed_delivery_recorded_and_cadence_continues() {
    let (engine, store, dispatcher) = start_engine().await;
    dispatcher.set_failing(true);

    let job = engine
        .add_job(JobSpec {
            target: "https://example.com/hook".to_string(),
            payload: "tick".to_string(),
            schedule: Schedule::recurring("* * * * * *"),
        })
        .await
        .unwrap();

    let records = wait_for_records(store.as_ref(), &job.id, 1, Duration::from_secs(5)).await;
    assert!(!records[0].success);
    assert_eq!(records[0].error.as_deref(), Some("scripted failure"));
    assert!(records[0].receipt_id.is_none());

    // Target recovers.
    dispatcher.set_failing(false);
    let seen = records.len();
    let records =
        wait_for_records(store.as_ref(), &job.id, seen + 1, Duration::from_secs(5)).await;

    assert!(records.iter().any(|r| r.success));
    assert!(records.iter().any(|r| !r.success));
    assert!(engine.get_job(&job.id).await.unwrap().active);
}

/// Test: cancelling stops future firings but keeps the accumulated
/// history readable.
#[tokio::test]
async fn test_cancel_preserves_history() {
    let (engine, store, dispatcher) = start_engine().await;

    let job = engine
        .add_job(JobSpec {
            target: "https://example.com/hook".to_string(),
            payload: "tick".to_string(),
            schedule: Schedule::recurring("* * * * * *"),
        })
        .await
        .unwrap();

    let records = wait_for_records(store.as_ref(), &job.id, 1, Duration::from_secs(5)).await;
    let fired = records.len();

    assert!(engine.cancel_job(&job.id).await.unwrap());
    let fired_at_cancel = dispatcher.delivery_count();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // No new firings, history intact.
    assert_eq!(dispatcher.delivery_count(), fired_at_cancel);
    let history = engine.history(&job.id, 100).await.unwrap();
    assert!(history.len() >= fired);
}
