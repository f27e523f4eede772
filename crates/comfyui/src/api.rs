//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (health check, image upload, workflow
//! submission, history retrieval) using [`reqwest`]. No retry policy
//! lives here; every method is one request/response round-trip.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::history::History;

/// MIME type sent with uploaded input images.
const UPLOAD_MIME: &str = "image/png";

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned an unexpected status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("Invalid response from ComfyUI: {0}")]
    InvalidResponse(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (carries the process-wide timeout and connection pool).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Health check: `GET /`.
    ///
    /// Only a `200 OK` counts as ready.
    pub async fn check_server(&self) -> Result<(), ComfyUIApiError> {
        let response = self.client.get(format!("{}/", self.api_url)).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    /// Upload an input image: `POST /upload/image`.
    ///
    /// Sends a multipart form with the file under `image` and
    /// `overwrite=true`, so re-running a job replaces earlier uploads
    /// with the same name.
    pub async fn upload_image(&self, name: &str, bytes: Vec<u8>) -> Result<(), ComfyUIApiError> {
        let part = Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(UPLOAD_MIME)?;
        let form = Form::new().part("image", part).text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the workflow as the sole value
    /// under `prompt`. Returns the server-assigned `prompt_id`.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({ "prompt": workflow });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let value: serde_json::Value = Self::parse_response(response).await?;
        if !value.get("prompt_id").is_some_and(serde_json::Value::is_string) {
            return Err(ComfyUIApiError::InvalidResponse(format!(
                "missing 'prompt_id' in {value}"
            )));
        }

        serde_json::from_value(value).map_err(|e| ComfyUIApiError::InvalidResponse(e.to_string()))
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The map is empty until
    /// ComfyUI has recorded the prompt.
    pub async fn get_history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Turn a non-success response into [`ComfyUIApiError::ApiError`],
    /// keeping the body text for the caller.
    async fn api_error(response: reqwest::Response) -> ComfyUIApiError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        ComfyUIApiError::ApiError {
            status: status.as_u16(),
            body,
        }
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ComfyUIApiError::InvalidResponse(e.to_string()))
    }
}
