//! Job input validation.
//!
//! Runs before any network activity and fails closed: a malformed shape
//! yields a single human-readable error, never a best-effort input.

use serde_json::{Map, Value};

use crate::error::WorkerError;
use crate::job::{InputImage, JobInput, RawInput};

pub const MSG_MISSING_INPUT: &str = "Please provide input";
pub const MSG_INVALID_JSON: &str = "Invalid JSON format in input";
pub const MSG_NOT_AN_OBJECT: &str = "Input must be a JSON object";
pub const MSG_MISSING_WORKFLOW: &str = "Missing 'workflow' parameter";
pub const MSG_INVALID_IMAGES: &str =
    "'images' must be a list of objects with 'name' and 'data' keys";

/// Keys accepted for an image payload. `image` is the older spelling.
const IMAGE_DATA_KEYS: &[&str] = &["data", "image"];

/// Normalize and validate raw job input.
pub fn validate_input(raw: RawInput) -> Result<JobInput, WorkerError> {
    let value = match raw {
        RawInput::Structured(value) => value,
        RawInput::Text(text) => {
            serde_json::from_str::<Value>(&text).map_err(|_| invalid(MSG_INVALID_JSON))?
        }
    };

    let mut obj = match value {
        Value::Null => return Err(invalid(MSG_MISSING_INPUT)),
        Value::Object(obj) => obj,
        _ => return Err(invalid(MSG_NOT_AN_OBJECT)),
    };

    let workflow = match obj.remove("workflow") {
        None | Some(Value::Null) => return Err(invalid(MSG_MISSING_WORKFLOW)),
        Some(workflow) => workflow,
    };

    let images = match obj.remove("images") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(parse_image)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid(MSG_INVALID_IMAGES))?,
        Some(_) => return Err(invalid(MSG_INVALID_IMAGES)),
    };

    Ok(JobInput { workflow, images })
}

fn parse_image(item: &Value) -> Option<InputImage> {
    let obj: &Map<String, Value> = item.as_object()?;
    let name = obj.get("name")?.as_str()?;
    let data = IMAGE_DATA_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))?;

    Some(InputImage {
        name: name.to_string(),
        data: data.to_string(),
    })
}

fn invalid(msg: &str) -> WorkerError {
    WorkerError::InputValidation(msg.to_string())
}
