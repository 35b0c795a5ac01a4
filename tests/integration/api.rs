//! API integration tests.
//!
//! These tests drive the router directly with `tower::ServiceExt::oneshot`,
//! no sockets involved.

use courier::api::{build_router, ApiState};
use courier::testing::RecordingDispatcher;
use courier::{InMemoryStore, ScheduleEngine};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::common::{wait_for_records, wait_until_inactive};

async fn create_test_state() -> (
    ApiState<InMemoryStore>,
    Arc<InMemoryStore>,
    Arc<RecordingDispatcher>,
) {
    let store = Arc::new(InMemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let engine = ScheduleEngine::start(Arc::clone(&store), dispatcher.clone())
        .await
        .unwrap();
    (ApiState::new(engine), store, dispatcher)
}

async fn send(state: &ApiState<InMemoryStore>, request: Request<Body>) -> Response<Body> {
    build_router(state.clone()).oneshot(request).await.unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn hourly_job_body() -> Value {
    json!({
        "target": "https://example.com/hook",
        "payload": "hello",
        "schedule": { "kind": "recurring", "cron": "0 * * * *" }
    })
}

/// Test: Health endpoint responds with status ok.
#[tokio::test]
async fn test_health_endpoint() {
    let (state, _, _) = create_test_state().await;

    let response = send(&state, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["armed_triggers"], 0);
    assert_eq!(json["recent_failures"], 0);
}

/// Test: failed deliveries surface through the failures endpoint and the
/// health check's recent-failure count.
#[tokio::test]
async fn test_failures_endpoint_reports_recent_failures() {
    let (state, store, dispatcher) = create_test_state().await;
    dispatcher.set_failing(true);

    let body = json!({
        "target": "https://example.com/hook",
        "payload": "doomed",
        "schedule": {
            "kind": "one_time",
            "at": (Utc::now() - ChronoDuration::seconds(1)).to_rfc3339()
        }
    });
    let created = body_json(send(&state, json_request("POST", "/api/jobs", body)).await).await;
    let job_id = courier::JobId::parse(created["id"].as_str().unwrap()).unwrap();
    wait_for_records(store.as_ref(), &job_id, 1, Duration::from_secs(5)).await;

    let response = send(&state, get_request("/api/failures")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["records"][0]["success"], false);
    assert_eq!(json["records"][0]["error"], "scripted failure");

    let health = body_json(send(&state, get_request("/api/health")).await).await;
    assert_eq!(health["recent_failures"], 1);

    // A window that starts now excludes the failure.
    let response = send(&state, get_request("/api/failures?hours=0")).await;
    assert_eq!(body_json(response).await["count"], 0);
}

/// Test: Creating a job returns 201 with the stored representation, and
/// the job is retrievable afterwards.
#[tokio::test]
async fn test_create_and_get_job() {
    let (state, _, _) = create_test_state().await;

    let response = send(&state, json_request("POST", "/api/jobs", hourly_job_body())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let created = body_json(response).await;
    assert_eq!(created["active"], true);
    assert_eq!(created["kind"], "recurring");
    assert_eq!(created["schedule"]["cron"], "0 * * * *");
    assert_eq!(created["schedule"]["timezone"], "UTC");
    assert!(created["last_executed"].is_null());

    let id = created["id"].as_str().unwrap();
    let response = send(&state, get_request(&format!("/api/jobs/{}", id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id);
}

/// Test: malformed schedules are rejected with 400 and nothing is stored.
#[tokio::test]
async fn test_create_job_with_bad_cron_is_rejected() {
    let (state, store, _) = create_test_state().await;

    let body = json!({
        "target": "https://example.com/hook",
        "payload": "hello",
        "schedule": { "kind": "recurring", "cron": "every now and then" }
    });
    let response = send(&state, json_request("POST", "/api/jobs", body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(courier::storage::JobStore::list_jobs(store.as_ref())
        .await
        .unwrap()
        .is_empty());
}

/// Test: a one-time instant that has already elapsed is accepted, fires
/// right away, and the job retires.
#[tokio::test]
async fn test_create_job_with_elapsed_instant_fires_immediately() {
    let (state, store, _) = create_test_state().await;

    let body = json!({
        "target": "https://example.com/hook",
        "payload": "better late than never",
        "schedule": {
            "kind": "one_time",
            "at": (Utc::now() - ChronoDuration::seconds(1)).to_rfc3339()
        }
    });
    let response = send(&state, json_request("POST", "/api/jobs", body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let created = body_json(response).await;
    let job_id = courier::JobId::parse(created["id"].as_str().unwrap()).unwrap();

    let records = wait_for_records(store.as_ref(), &job_id, 1, Duration::from_secs(5)).await;
    assert!(records[0].success);
    wait_until_inactive(store.as_ref(), &job_id, Duration::from_secs(5)).await;
}

/// Test: empty targets are rejected.
#[tokio::test]
async fn test_create_job_with_empty_target_is_rejected() {
    let (state, _, _) = create_test_state().await;

    let body = json!({
        "target": "",
        "payload": "hello",
        "schedule": { "kind": "recurring", "cron": "0 * * * *" }
    });
    let response = send(&state, json_request("POST", "/api/jobs", body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: listing returns every job, active or not.
#[tokio::test]
async fn test_list_jobs_endpoint() {
    let (state, _, _) = create_test_state().await;

    for _ in 0..3 {
        let response = send(&state, json_request("POST", "/api/jobs", hourly_job_body())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = send(&state, get_request("/api/jobs")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 3);
    assert!(json["jobs"].is_array());
}

/// Test: unknown ids are 404, malformed ids are 400.
#[tokio::test]
async fn test_get_job_error_statuses() {
    let (state, _, _) = create_test_state().await;

    let response = send(
        &state,
        get_request(&format!("/api/jobs/{}", courier::JobId::new())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&state, get_request("/api/jobs/not-a-uuid")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: DELETE cancels a job; cancelling again reports it was already
/// inactive.
#[tokio::test]
async fn test_cancel_job_endpoint() {
    let (state, _, _) = create_test_state().await;

    let created = body_json(
        send(&state, json_request("POST", "/api/jobs", hourly_job_body())).await,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = send(
        &state,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/jobs/{}", id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], true);

    let response = send(
        &state,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/jobs/{}", id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], false);

    let job = body_json(send(&state, get_request(&format!("/api/jobs/{}", id))).await).await;
    assert_eq!(job["active"], false);
}

/// Test: cancelling an unknown job is 404.
#[tokio::test]
async fn test_cancel_unknown_job_is_not_found() {
    let (state, _, _) = create_test_state().await;

    let response = send(
        &state,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/jobs/{}", courier::JobId::new()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test: PUT replaces the schedule and reactivates the job.
#[tokio::test]
async fn test_reschedule_job_endpoint() {
    let (state, _, _) = create_test_state().await;

    let created = body_json(
        send(&state, json_request("POST", "/api/jobs", hourly_job_body())).await,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let at = (Utc::now() + ChronoDuration::hours(2)).to_rfc3339();
    let response = send(
        &state,
        json_request(
            "PUT",
            &format!("/api/jobs/{}/schedule", id),
            json!({ "schedule": { "kind": "one_time", "at": at } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = body_json(response).await;
    assert_eq!(updated["kind"], "one_time");
    assert_eq!(updated["active"], true);

    // Invalid replacement is rejected.
    let response = send(
        &state,
        json_request(
            "PUT",
            &format!("/api/jobs/{}/schedule", id),
            json!({ "schedule": { "kind": "recurring", "cron": "nope" } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: the history endpoint exposes execution records once a job has
/// fired.
#[tokio::test]
async fn test_history_endpoint() {
    let (state, store, _) = create_test_state().await;

    let body = json!({
        "target": "https://example.com/hook",
        "payload": "soon",
        "schedule": {
            "kind": "one_time",
            "at": (Utc::now() + ChronoDuration::milliseconds(200)).to_rfc3339()
        }
    });
    let created = body_json(send(&state, json_request("POST", "/api/jobs", body)).await).await;
    let id = created["id"].as_str().unwrap().to_string();

    let job_id = courier::JobId::parse(&id).unwrap();
    wait_for_records(store.as_ref(), &job_id, 1, Duration::from_secs(5)).await;

    let response = send(&state, get_request(&format!("/api/jobs/{}/history", id))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["records"][0]["success"], true);
    assert_eq!(json["records"][0]["job_id"], id);

    // Unknown jobs have no history, not an empty one.
    let response = send(
        &state,
        get_request(&format!("/api/jobs/{}/history", courier::JobId::new())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
