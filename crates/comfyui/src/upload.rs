//! Input image upload stage.
//!
//! Every image is attempted, even after a failure, so the caller gets the
//! full list of what went wrong. Any failure stops the job before the
//! workflow is submitted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use comfy_worker_core::error::WorkerError;
use comfy_worker_core::job::InputImage;

use crate::api::ComfyUIApi;

pub const MSG_NOTHING_TO_UPLOAD: &str = "No images to upload";
pub const MSG_ALL_UPLOADED: &str = "All images uploaded successfully";
pub const MSG_SOME_FAILED: &str = "Some images failed to upload";

/// Aggregate result of a successful upload stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub message: String,
    /// One confirmation per uploaded image.
    pub details: Vec<String>,
}

/// Decode an image payload, tolerating a `data:<mime>;base64,` prefix.
pub fn decode_image_data(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => data,
    };
    STANDARD.decode(payload)
}

/// Upload all input images to ComfyUI's input directory.
pub async fn upload_images(
    api: &ComfyUIApi,
    images: &[InputImage],
) -> Result<UploadOutcome, WorkerError> {
    if images.is_empty() {
        return Ok(UploadOutcome {
            message: MSG_NOTHING_TO_UPLOAD.to_string(),
            details: Vec::new(),
        });
    }

    tracing::info!(count = images.len(), "Uploading input images");

    let mut uploaded = Vec::with_capacity(images.len());
    let mut errors = Vec::new();

    for image in images {
        let bytes = match decode_image_data(&image.data) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(name = %image.name, error = %e, "Invalid image payload");
                errors.push(format!(
                    "Error uploading {}: invalid base64 payload: {e}",
                    image.name
                ));
                continue;
            }
        };

        match api.upload_image(&image.name, bytes).await {
            Ok(()) => {
                tracing::debug!(name = %image.name, "Uploaded input image");
                uploaded.push(format!("Successfully uploaded {}", image.name));
            }
            Err(e) => {
                tracing::warn!(name = %image.name, error = %e, "Image upload failed");
                errors.push(format!("Error uploading {}: {e}", image.name));
            }
        }
    }

    if !errors.is_empty() {
        tracing::error!(failed = errors.len(), "Image upload finished with errors");
        return Err(WorkerError::AssetUpload {
            message: MSG_SOME_FAILED.to_string(),
            details: errors,
        });
    }

    tracing::info!("Image upload complete");
    Ok(UploadOutcome {
        message: MSG_ALL_UPLOADED.to_string(),
        details: uploaded,
    })
}
