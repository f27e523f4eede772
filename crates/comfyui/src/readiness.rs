//! Readiness gate.
//!
//! ComfyUI can take a long time to start (model loading, custom node
//! imports). Before a job touches the backend, [`probe`] polls `GET /`
//! until it answers `200 OK` or the attempt budget runs out.

use std::convert::Infallible;

use comfy_worker_core::config::{ReadinessPolicy, RetryPolicy};
use comfy_worker_core::error::WorkerError;

use crate::api::ComfyUIApi;
use crate::retry::{attempt, Attempt, RetryError};

/// Result of a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Probe the backend until it is reachable or the budget is spent.
///
/// Connection failures and non-200 responses are both treated as
/// "not ready yet".
pub async fn probe(api: &ComfyUIApi, policy: &RetryPolicy) -> ProbeOutcome {
    let result = attempt(policy, move |n| async move {
        match api.check_server().await {
            Ok(()) => Attempt::Done(n),
            Err(e) => {
                tracing::debug!(attempt = n, error = %e, "ComfyUI not ready yet");
                Attempt::<u32, Infallible>::Pending
            }
        }
    })
    .await;

    match result {
        Ok(attempts) => {
            tracing::info!(attempts, "ComfyUI API is reachable");
            ProbeOutcome {
                reachable: true,
                attempts,
            }
        }
        Err(RetryError::Exhausted { attempts }) => {
            tracing::warn!(
                api_url = %api.api_url(),
                attempts,
                "Failed to connect to ComfyUI",
            );
            ProbeOutcome {
                reachable: false,
                attempts,
            }
        }
        Err(RetryError::Aborted { error, .. }) => match error {},
    }
}

/// Probe and apply the configured exhaustion policy.
///
/// With [`ReadinessPolicy::Lenient`] an unreachable backend is logged and
/// the job carries on; submission will then surface the transport error.
/// With [`ReadinessPolicy::Strict`] the job ends here.
pub async fn ensure_ready(
    api: &ComfyUIApi,
    policy: &RetryPolicy,
    readiness: ReadinessPolicy,
) -> Result<ProbeOutcome, WorkerError> {
    let outcome = probe(api, policy).await;

    if outcome.reachable {
        return Ok(outcome);
    }

    match readiness {
        ReadinessPolicy::Lenient => {
            tracing::warn!("Proceeding although ComfyUI did not become ready");
            Ok(outcome)
        }
        ReadinessPolicy::Strict => Err(WorkerError::BackendUnavailable {
            attempts: outcome.attempts,
        }),
    }
}
