//! End-to-end tests for the job pipeline against a mock ComfyUI.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{handler_for, test_config, MockBackend, MockBehavior, RecordingStore};
use comfy_worker_comfyui::upload::MSG_SOME_FAILED;
use comfy_worker_core::config::{ExecutionErrorPolicy, ReadinessPolicy};
use comfy_worker_core::job::{JobRequest, RawInput};
use comfy_worker_core::storage::ArtifactStore;
use comfy_worker_core::validation::{
    MSG_INVALID_JSON, MSG_MISSING_INPUT, MSG_MISSING_WORKFLOW, MSG_NOT_AN_OBJECT,
};
use serde_json::{json, Value};

fn job(input: Value) -> JobRequest {
    JobRequest {
        id: "job-1".into(),
        input: RawInput::Structured(input),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

// ---------------------------------------------------------------------------
// Test: happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workflow_runs_to_base64_images() {
    let backend = MockBackend::start(MockBehavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.png"), b"generated").unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler
        .handle(job(json!({"workflow": {"1": {}}, "images": []})))
        .await;

    assert_eq!(
        to_json(&result),
        json!({
            "status": "success",
            "images": [STANDARD.encode(b"generated")],
            "refresh_worker": false,
        })
    );
    assert_eq!(backend.submissions(), vec![json!({"prompt": {"1": {}}})]);
    assert_eq!(backend.upload_calls(), 0);
}

#[tokio::test]
async fn string_input_and_images_run_end_to_end() {
    let backend = MockBackend::start(MockBehavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.png"), b"out").unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let input = json!({
        "workflow": {"1": {"class_type": "LoadImage", "inputs": {"image": "in.png"}}},
        "images": [{"name": "in.png", "image": "aW4="}],
    });
    let result = handler
        .handle(JobRequest {
            id: "job-2".into(),
            input: RawInput::Text(input.to_string()),
        })
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(backend.uploads()[0].bytes, b"in");
    assert_eq!(backend.submit_calls(), 1);
}

#[tokio::test]
async fn remote_store_returns_urls() {
    let backend = MockBackend::start(MockBehavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.png"), b"generated").unwrap();
    let store = Arc::new(RecordingStore::default());
    let shared: Arc<dyn ArtifactStore> = store.clone();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), Some(shared));

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    assert_eq!(
        to_json(&result)["images"],
        json!(["https://bucket.example/job-1/x.png"])
    );
    assert_eq!(store.calls.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: validation failures never touch the backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_input_makes_no_backend_calls() {
    let backend = MockBackend::start(MockBehavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let cases = [
        (RawInput::Structured(Value::Null), MSG_MISSING_INPUT),
        (RawInput::Text("{not json".into()), MSG_INVALID_JSON),
        (RawInput::Structured(json!([1, 2])), MSG_NOT_AN_OBJECT),
        (RawInput::Text("\"workflow\"".into()), MSG_NOT_AN_OBJECT),
        (RawInput::Structured(json!({"images": []})), MSG_MISSING_WORKFLOW),
    ];

    for (input, expected) in cases {
        let result = handler
            .handle(JobRequest {
                id: "bad".into(),
                input,
            })
            .await;
        assert_eq!(
            to_json(&result),
            json!({"status": "error", "error": expected, "refresh_worker": false})
        );
    }

    assert_eq!(backend.total_calls(), 0);
}

// ---------------------------------------------------------------------------
// Test: stage failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_failure_stops_before_submission() {
    let backend = MockBackend::start(MockBehavior {
        reject_uploads: vec!["a.png".into()],
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler
        .handle(job(json!({
            "workflow": {},
            "images": [{"name": "a.png", "image": "YQ=="}, {"name": "b.png", "image": "Yg=="}],
        })))
        .await;

    let value = to_json(&result);
    assert_eq!(value["status"], "error");
    assert_eq!(value["message"], MSG_SOME_FAILED);
    assert_eq!(value["details"].as_array().unwrap().len(), 1);
    assert!(value.get("images").is_none());
    assert_eq!(backend.upload_calls(), 2);
    assert_eq!(backend.submit_calls(), 0);
}

#[tokio::test]
async fn rejected_submission_is_reported_and_not_polled() {
    let backend = MockBackend::start(MockBehavior {
        submit_status: StatusCode::BAD_REQUEST,
        submit_body: json!({"error": "invalid prompt"}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    let error = result.error.unwrap();
    assert!(error.starts_with("Error queuing workflow:"), "{error}");
    assert_eq!(backend.history_calls(), 0);
}

#[tokio::test]
async fn poll_timeout_is_reported() {
    let backend = MockBackend::start(MockBehavior {
        outputs_from_call: None,
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    assert_eq!(
        result.error.as_deref(),
        Some("Max retries reached while waiting for image generation")
    );
    assert_eq!(backend.history_calls(), 5);
}

fn failed_execution() -> MockBehavior {
    MockBehavior {
        outputs_from_call: None,
        history_status: Some(json!({"status_str": "error", "messages": []})),
        ..Default::default()
    }
}

#[tokio::test]
async fn execution_error_waits_out_the_poll_budget_by_default() {
    let backend = MockBackend::start(failed_execution()).await;
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    assert_eq!(
        result.error.as_deref(),
        Some("Max retries reached while waiting for image generation")
    );
    assert_eq!(backend.history_calls(), 5);
}

#[tokio::test]
async fn execution_error_fails_fast_when_configured() {
    let backend = MockBackend::start(failed_execution()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&backend, dir.path());
    config.execution_errors = ExecutionErrorPolicy::FailFast;
    let handler = handler_for(&backend, config, None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    assert_eq!(
        result.error.as_deref(),
        Some("Workflow execution failed: execution reported an error")
    );
    assert_eq!(backend.history_calls(), 1);
}

#[tokio::test]
async fn missing_output_file_still_succeeds() {
    let backend = MockBackend::start(MockBehavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    let value = to_json(&result);
    assert_eq!(value["status"], "success");
    let placeholder = value["images"][0].as_str().unwrap();
    assert!(placeholder.starts_with("Image not found: "));
    assert!(placeholder.ends_with("x.png"));
}

// ---------------------------------------------------------------------------
// Test: readiness policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lenient_readiness_still_submits() {
    let backend = MockBackend::start(MockBehavior {
        health_failures: 100,
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.png"), b"x").unwrap();
    let handler = handler_for(&backend, test_config(&backend, dir.path()), None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    assert!(result.is_success());
    assert_eq!(backend.health_calls(), 3);
    assert_eq!(backend.submit_calls(), 1);
}

#[tokio::test]
async fn strict_readiness_fails_the_job() {
    let backend = MockBackend::start(MockBehavior {
        health_failures: 100,
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&backend, dir.path());
    config.readiness = ReadinessPolicy::Strict;
    let handler = handler_for(&backend, config, None);

    let result = handler.handle(job(json!({"workflow": {}}))).await;

    assert_eq!(
        result.error.as_deref(),
        Some("ComfyUI API unreachable after 3 attempts")
    );
    assert_eq!(backend.submit_calls(), 0);
}

// ---------------------------------------------------------------------------
// Test: refresh flag is echoed on every result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_worker_is_echoed() {
    let backend = MockBackend::start(MockBehavior::default()).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.png"), b"x").unwrap();
    let mut config = test_config(&backend, dir.path());
    config.refresh_worker = true;
    let handler = handler_for(&backend, config, None);

    let ok = handler.handle(job(json!({"workflow": {}}))).await;
    let failed = handler.handle(job(Value::Null)).await;

    assert!(ok.is_success());
    assert!(ok.refresh_worker);
    assert!(!failed.is_success());
    assert!(failed.refresh_worker);
}
