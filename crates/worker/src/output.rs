//! Output materialization.
//!
//! Turns the file references in a completed history entry into artifacts
//! the caller can use: base64 text by default, or a link to a copy in the
//! external store when one is configured. Files ComfyUI reported but that
//! are not on disk become a placeholder; the rest of the batch carries on.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use comfy_worker_comfyui::history::HistoryEntry;
use comfy_worker_core::error::WorkerError;
use comfy_worker_core::job::OutputArtifact;
use comfy_worker_core::storage::ArtifactStore;

/// Materialize every reported output file, in reported order.
pub async fn materialize(
    entry: &HistoryEntry,
    job_id: &str,
    output_dir: &Path,
    store: Option<&dyn ArtifactStore>,
) -> Result<Vec<OutputArtifact>, WorkerError> {
    let images = entry.output_images();
    let mut artifacts = Vec::with_capacity(images.len());

    for image in images {
        let path = image.local_path(output_dir);
        tracing::debug!(job_id, path = %path.display(), "Processing output image");

        let exists = tokio::fs::try_exists(&path).await.map_err(|e| {
            WorkerError::Materialization(format!("cannot access {}: {e}", path.display()))
        })?;

        if !exists {
            tracing::warn!(job_id, path = %path.display(), "Output image not found");
            artifacts.push(OutputArtifact::Missing(path));
            continue;
        }

        let artifact = match store {
            Some(store) => {
                let url = store
                    .put_image(job_id, &path)
                    .await
                    .map_err(|e| WorkerError::Materialization(e.to_string()))?;
                OutputArtifact::Remote(url)
            }
            None => OutputArtifact::Inline(encode_file(&path).await?),
        };
        artifacts.push(artifact);
    }

    tracing::info!(
        job_id,
        count = artifacts.len(),
        remote = store.is_some(),
        "Output images processed",
    );

    Ok(artifacts)
}

async fn encode_file(path: &Path) -> Result<String, WorkerError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        WorkerError::Materialization(format!("failed to read {}: {e}", path.display()))
    })?;
    Ok(STANDARD.encode(bytes))
}
