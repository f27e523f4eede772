//! Typed view of the ComfyUI `/history/{prompt_id}` response.
//!
//! The adapter only reads two things from a history entry: whether its
//! `outputs` are populated, and which files each node reported. Node
//! outputs keep the order ComfyUI reported them in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

/// History response keyed by prompt ID.
pub type History = HashMap<String, HistoryEntry>;

/// Execution record for one prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Node ID -> node output object. Absent or empty until execution
    /// has produced something.
    #[serde(default)]
    pub outputs: Option<Map<String, Value>>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

/// The `status` block ComfyUI attaches to a history entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionStatus {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, payload]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// A file reported in a node's `images` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl OutputImage {
    /// Expected location on disk: `<output_dir>/<subfolder>/<filename>`.
    pub fn local_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.subfolder).join(&self.filename)
    }
}

impl HistoryEntry {
    /// Outputs are present and non-empty.
    pub fn is_complete(&self) -> bool {
        self.outputs.as_ref().is_some_and(|outputs| !outputs.is_empty())
    }

    /// The backend's error text when the execution failed, `None` otherwise.
    pub fn error_message(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        if status.status_str.as_deref() != Some("error") {
            return None;
        }

        let messages: Vec<String> = status
            .messages
            .iter()
            .filter_map(|msg| {
                let pair = msg.as_array()?;
                if pair.first()?.as_str()? != "execution_error" {
                    return None;
                }
                let payload = pair.get(1)?;
                let text = payload.get("exception_message")?.as_str()?.trim();
                Some(match payload.get("node_type").and_then(Value::as_str) {
                    Some(node_type) => format!("{node_type}: {text}"),
                    None => text.to_string(),
                })
            })
            .collect();

        if messages.is_empty() {
            Some("execution reported an error".to_string())
        } else {
            Some(messages.join("; "))
        }
    }

    /// Files reported across all nodes, flattened in reported order.
    ///
    /// Nodes without an `images` list are skipped, as are entries that
    /// do not look like a file descriptor.
    pub fn output_images(&self) -> Vec<OutputImage> {
        let Some(outputs) = &self.outputs else {
            return Vec::new();
        };

        let mut images = Vec::new();
        for (node_id, node_output) in outputs {
            let Some(list) = node_output.get("images").and_then(Value::as_array) else {
                continue;
            };
            for item in list {
                match OutputImage::deserialize(item) {
                    Ok(image) => images.push(image),
                    Err(e) => {
                        tracing::warn!(node_id = %node_id, error = %e, "Skipping malformed output entry");
                    }
                }
            }
        }
        images
    }
}
