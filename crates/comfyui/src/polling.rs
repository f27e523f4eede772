//! Workflow submission and result polling.
//!
//! ComfyUI executes prompts asynchronously. After [`submit`] returns a
//! prompt ID, [`poll_until_complete`] fetches `/history/{prompt_id}`
//! until the entry has outputs or the poll budget runs out.

use comfy_worker_core::config::{ExecutionErrorPolicy, RetryPolicy};
use comfy_worker_core::error::WorkerError;

use crate::api::ComfyUIApi;
use crate::history::HistoryEntry;
use crate::retry::{attempt, Attempt, RetryError};

/// Queue a workflow and return its prompt ID.
pub async fn submit(api: &ComfyUIApi, workflow: &serde_json::Value) -> Result<String, WorkerError> {
    let response = api
        .submit_workflow(workflow)
        .await
        .map_err(|e| WorkerError::Submission(e.to_string()))?;

    tracing::info!(
        prompt_id = %response.prompt_id,
        queue_number = ?response.number,
        "Queued workflow",
    );

    Ok(response.prompt_id)
}

/// Poll the history endpoint until `prompt_id` has outputs.
///
/// A failed history fetch aborts polling immediately instead of counting
/// as a spent attempt. A recorded execution error only ends polling early
/// under [`ExecutionErrorPolicy::FailFast`]; otherwise it is one more
/// entry without outputs.
pub async fn poll_until_complete(
    api: &ComfyUIApi,
    prompt_id: &str,
    policy: &RetryPolicy,
    on_error: ExecutionErrorPolicy,
) -> Result<HistoryEntry, WorkerError> {
    tracing::info!(
        prompt_id,
        max_polls = policy.max_attempts,
        "Waiting until image generation is complete",
    );

    let result = attempt(policy, move |n| async move {
        let mut history = match api.get_history(prompt_id).await {
            Ok(history) => history,
            Err(e) => return Attempt::Abort(WorkerError::PollTransport(e.to_string())),
        };

        match history.remove(prompt_id) {
            Some(entry) if entry.is_complete() => Attempt::Done(entry),
            Some(entry) => match entry.error_message() {
                Some(msg) if on_error == ExecutionErrorPolicy::FailFast => {
                    Attempt::Abort(WorkerError::ExecutionFailed(msg))
                }
                Some(msg) => {
                    tracing::warn!(
                        prompt_id,
                        attempt = n,
                        error = %msg,
                        "Execution error recorded, still waiting for outputs",
                    );
                    Attempt::Pending
                }
                None => {
                    tracing::debug!(prompt_id, attempt = n, "Prompt recorded, no outputs yet");
                    Attempt::Pending
                }
            },
            None => {
                tracing::debug!(prompt_id, attempt = n, "Prompt not in history yet");
                Attempt::Pending
            }
        }
    })
    .await;

    match result {
        Ok(entry) => {
            tracing::info!(prompt_id, "Image generation complete");
            Ok(entry)
        }
        Err(RetryError::Exhausted { attempts }) => {
            tracing::error!(prompt_id, attempts, "Max retries reached while polling");
            Err(WorkerError::PollTimeout { attempts })
        }
        Err(RetryError::Aborted { attempt, error }) => {
            tracing::error!(prompt_id, attempt, error = %error, "Polling aborted");
            Err(error)
        }
    }
}
