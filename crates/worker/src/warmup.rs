//! Start-up warm-up job.
//!
//! Runs a tiny workflow through the full pipeline before the worker
//! accepts real jobs, so model loading happens up front. A failed
//! warm-up is logged and otherwise ignored.

use std::path::Path;

use comfy_worker_core::job::{JobRequest, JobResult, RawInput};

use crate::handler::JobHandler;

/// Job ID used for the warm-up run.
pub const WARMUP_JOB_ID: &str = "warmup";

/// Workflow bundled with the binary.
const BUNDLED_WORKFLOW: &str = include_str!("../assets/warmup_workflow.json");

/// Load the warm-up workflow from `path`, or the bundled one.
pub async fn load_workflow(path: Option<&Path>) -> anyhow::Result<serde_json::Value> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => BUNDLED_WORKFLOW.to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Run `workflow` as a throwaway job.
pub async fn run(handler: &JobHandler, workflow: serde_json::Value) -> JobResult {
    tracing::info!("Starting warm-up job");

    let job = JobRequest {
        id: WARMUP_JOB_ID.to_string(),
        input: RawInput::Structured(serde_json::json!({ "workflow": workflow })),
    };
    let result = handler.handle(job).await;

    if result.is_success() {
        tracing::info!("Warm-up job finished");
    } else {
        tracing::warn!(error = ?result.error, "Warm-up job failed, continuing");
    }
    result
}
