#![allow(dead_code)]

//! In-process mock of the ComfyUI HTTP API.
//!
//! Binds an axum server to an ephemeral port on localhost. Behaviour is
//! scripted through [`MockBehavior`]; every endpoint counts its calls so
//! tests can assert exactly how many round-trips a stage made.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use comfy_worker::handler::JobHandler;
use comfy_worker_comfyui::api::ComfyUIApi;
use comfy_worker_core::config::{RetryPolicy, WorkerConfig};
use comfy_worker_core::storage::{ArtifactStore, StorageError};

pub const PROMPT_ID: &str = "abc";

// ---------------------------------------------------------------------------
// Scripted behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Number of initial `GET /` calls answered with 503.
    pub health_failures: usize,
    /// Upload names rejected with a 500.
    pub reject_uploads: Vec<String>,
    pub submit_status: StatusCode,
    pub submit_body: Value,
    /// 1-based history call from which outputs are returned. `None` = never.
    pub outputs_from_call: Option<usize>,
    pub outputs: Value,
    /// Status block attached to the history entry once it is recorded.
    pub history_status: Option<Value>,
    /// Answer history calls with a non-JSON body.
    pub history_garbage: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            health_failures: 0,
            reject_uploads: Vec::new(),
            submit_status: StatusCode::OK,
            submit_body: json!({"prompt_id": PROMPT_ID, "number": 0, "node_errors": {}}),
            outputs_from_call: Some(1),
            outputs: json!({
                "8": {"images": [{"filename": "x.png", "subfolder": "", "type": "output"}]}
            }),
            history_status: None,
            history_garbage: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub overwrite: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    pub behavior: MockBehavior,
    pub health_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub submissions: Mutex<Vec<Value>>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct MockBackend {
    pub url: String,
    pub state: Arc<MockState>,
    task: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(behavior: MockBehavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            ..Default::default()
        });

        let app = Router::new()
            .route("/", get(health))
            .route("/upload/image", post(upload))
            .route("/prompt", post(prompt))
            .route("/history/{prompt_id}", get(history))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
            task,
        }
    }

    pub fn api(&self) -> ComfyUIApi {
        ComfyUIApi::new(self.url.clone())
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.state.upload_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.state.submit_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.state.history_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.health_calls() + self.upload_calls() + self.submit_calls() + self.history_calls()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state.submissions.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn health(State(state): State<Arc<MockState>>) -> (StatusCode, &'static str) {
    let n = state.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if n <= state.behavior.health_failures {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    } else {
        (StatusCode::OK, "ok")
    }
}

async fn upload(
    State(state): State<Arc<MockState>>,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    state.upload_calls.fetch_add(1, Ordering::SeqCst);

    let mut recorded = RecordedUpload {
        file_name: None,
        bytes: Vec::new(),
        overwrite: None,
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name() {
            Some("image") => {
                recorded.file_name = field.file_name().map(str::to_owned);
                recorded.bytes = field.bytes().await.unwrap().to_vec();
            }
            Some("overwrite") => {
                recorded.overwrite = Some(field.text().await.unwrap());
            }
            _ => {}
        }
    }

    let rejected = recorded
        .file_name
        .as_ref()
        .is_some_and(|name| state.behavior.reject_uploads.contains(name));
    state.uploads.lock().unwrap().push(recorded);

    if rejected {
        (StatusCode::INTERNAL_SERVER_ERROR, "disk full".to_string())
    } else {
        (StatusCode::OK, json!({"name": "ok"}).to_string())
    }
}

async fn prompt(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.submit_calls.fetch_add(1, Ordering::SeqCst);
    state.submissions.lock().unwrap().push(body);
    (state.behavior.submit_status, Json(state.behavior.submit_body.clone()))
}

async fn history(
    State(state): State<Arc<MockState>>,
    UrlPath(prompt_id): UrlPath<String>,
) -> (StatusCode, String) {
    let n = state.history_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let behavior = &state.behavior;

    if behavior.history_garbage {
        return (StatusCode::OK, "<html>oops</html>".to_string());
    }

    let ready = behavior.outputs_from_call.is_some_and(|from| n >= from);
    let body = if ready {
        let mut entry = json!({"outputs": behavior.outputs});
        if let Some(status) = &behavior.history_status {
            entry["status"] = status.clone();
        }
        json!({ prompt_id: entry })
    } else if let Some(status) = &behavior.history_status {
        json!({ prompt_id: {"outputs": {}, "status": status} })
    } else {
        json!({})
    };

    (StatusCode::OK, body.to_string())
}

// ---------------------------------------------------------------------------
// Handler helpers
// ---------------------------------------------------------------------------

/// Worker config pointed at `backend` with tight budgets.
pub fn test_config(backend: &MockBackend, output_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        comfy_host: backend.url.clone(),
        probe: RetryPolicy::new(3, Duration::from_millis(1)),
        poll: RetryPolicy::new(5, Duration::from_millis(1)),
        output_dir: output_dir.to_path_buf(),
        warmup_on_start: false,
        ..Default::default()
    }
}

pub fn handler_for(
    backend: &MockBackend,
    config: WorkerConfig,
    store: Option<Arc<dyn ArtifactStore>>,
) -> JobHandler {
    JobHandler::new(Arc::new(config), backend.api(), store)
}

// ---------------------------------------------------------------------------
// Artifact stores
// ---------------------------------------------------------------------------

/// Records calls and answers with a fake URL.
#[derive(Default)]
pub struct RecordingStore {
    pub calls: Mutex<Vec<(String, std::path::PathBuf)>>,
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn put_image(&self, job_id: &str, path: &Path) -> Result<String, StorageError> {
        self.calls
            .lock()
            .unwrap()
            .push((job_id.to_string(), path.to_path_buf()));
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(format!("https://bucket.example/{job_id}/{name}"))
    }
}

/// Always fails to upload.
pub struct FailingStore;

#[async_trait]
impl ArtifactStore for FailingStore {
    async fn put_image(&self, _job_id: &str, _path: &Path) -> Result<String, StorageError> {
        Err(StorageError::Upload("access denied".to_string()))
    }
}
