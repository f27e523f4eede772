//! External artifact storage seam.
//!
//! When a bucket endpoint is configured, generated files are copied to
//! an external store and the job result carries a reference to the copy
//! instead of inline bytes. The concrete S3 implementation lives in the
//! `cloud` crate; this module holds the trait and object naming rules.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Length of the random stem used for stored object names.
const OBJECT_STEM_LEN: usize = 8;

/// Errors from an artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("could not create download link: {0}")]
    Presign(String),
}

/// Destination for generated files that should not be returned inline.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist the file at `path` for `job_id` and return a reference
    /// (usually a URL) the caller can fetch it from.
    async fn put_image(&self, job_id: &str, path: &Path) -> Result<String, StorageError>;
}

/// Month bucket (`MM-YY`) used when no bucket name is configured.
pub fn default_bucket_name(now: DateTime<Utc>) -> String {
    now.format("%m-%y").to_string()
}

/// Object key for a stored file: `<job_id>/<random stem><.ext>`.
pub fn object_key(job_id: &str, path: &Path) -> String {
    let stem: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(OBJECT_STEM_LEN)
        .collect();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{job_id}/{stem}.{ext}"),
        None => format!("{job_id}/{stem}"),
    }
}

/// MIME type derived from the file extension (`image/<ext>`).
pub fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => match ext.to_ascii_lowercase().as_str() {
            "jpg" => "image/jpeg".to_string(),
            other => format!("image/{other}"),
        },
        None => "application/octet-stream".to_string(),
    }
}
