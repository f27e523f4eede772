//! Job data model at the job-queue boundary.
//!
//! A [`JobRequest`] arrives once per unit of work and exactly one
//! [`JobResult`] goes back.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::WorkerError;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A unit of work handed to the worker by the job queue.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    pub id: String,
    #[serde(default)]
    pub input: RawInput,
}

/// Job input exactly as received.
///
/// Some callers send the input object JSON-encoded inside a string.
/// Both shapes are normalized by [`validate_input`](crate::validation::validate_input).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawInput {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for RawInput {
    fn default() -> Self {
        RawInput::Structured(serde_json::Value::Null)
    }
}

/// An input image to push to the backend before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    /// Filename the workflow refers to (e.g. from a `LoadImage` node).
    pub name: String,
    /// Base64 payload, optionally prefixed with a `data:` URI header.
    pub data: String,
}

/// Validated job input.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    /// Opaque workflow graph, forwarded verbatim.
    pub workflow: serde_json::Value,
    pub images: Vec<InputImage>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One generated file, as handed back to the caller.
///
/// Serializes as a plain string in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputArtifact {
    /// Base64-encoded file contents.
    Inline(String),
    /// Reference (URL) to a copy in the external store.
    Remote(String),
    /// The backend reported the file but it is not on disk.
    Missing(PathBuf),
}

impl fmt::Display for OutputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputArtifact::Inline(data) => f.write_str(data),
            OutputArtifact::Remote(url) => f.write_str(url),
            OutputArtifact::Missing(path) => write!(f, "Image not found: {}", path.display()),
        }
    }
}

impl Serialize for OutputArtifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Error,
}

/// The single terminal result returned for a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<OutputArtifact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Tells the job runtime whether to recycle this worker afterwards.
    pub refresh_worker: bool,
}

impl JobResult {
    pub fn success(images: Vec<OutputArtifact>, refresh_worker: bool) -> Self {
        Self {
            status: JobStatus::Success,
            images: Some(images),
            error: None,
            message: None,
            details: Vec::new(),
            refresh_worker,
        }
    }

    /// Build an error result. Carries no image data.
    pub fn failure(err: &WorkerError, refresh_worker: bool) -> Self {
        let (message, details) = match err {
            WorkerError::AssetUpload { message, details } => {
                (Some(message.clone()), details.clone())
            }
            _ => (None, Vec::new()),
        };

        Self {
            status: JobStatus::Error,
            images: None,
            error: Some(err.to_string()),
            message,
            details,
            refresh_worker,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}
