/// Errors raised while building [`WorkerConfig`](crate::config::WorkerConfig).
///
/// These are setup failures: the binary aborts instead of accepting jobs
/// with a half-parsed configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Terminal outcomes of a single job.
///
/// Every variant ends the job with an error result; none of them abort
/// the process. A missing output file is not represented here because it
/// degrades to a per-file placeholder instead of failing the job.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Malformed or missing job input. Raised before any network call.
    #[error("{0}")]
    InputValidation(String),

    /// One or more input images could not be uploaded. The workflow was
    /// never submitted.
    #[error("{message}")]
    AssetUpload {
        message: String,
        /// One entry per failed image.
        details: Vec<String>,
    },

    /// The readiness probe ran out of attempts and the worker is
    /// configured to fail fast.
    #[error("ComfyUI API unreachable after {attempts} attempts")]
    BackendUnavailable { attempts: u32 },

    /// The backend rejected the workflow or could not be reached.
    #[error("Error queuing workflow: {0}")]
    Submission(String),

    /// The poll budget ran out before any outputs appeared.
    #[error("Max retries reached while waiting for image generation")]
    PollTimeout { attempts: u32 },

    /// A history fetch failed mid-poll. Polling stops on the first one.
    #[error("Error waiting for image generation: {0}")]
    PollTransport(String),

    /// The backend reported the execution itself as failed.
    #[error("Workflow execution failed: {0}")]
    ExecutionFailed(String),

    /// An existing output file could not be read or persisted.
    #[error("Error processing output images: {0}")]
    Materialization(String),
}
