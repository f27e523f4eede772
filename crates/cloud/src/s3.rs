//! S3-compatible artifact store.
//!
//! Uploads generated images to `<bucket>/<job_id>/<stem><ext>` and hands
//! back a presigned GET URL. Works with AWS S3 and S3-compatible
//! services (R2, MinIO, Backblaze) through an explicit endpoint URL.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Utc};

use comfy_worker_core::config::BucketConfig;
use comfy_worker_core::storage::{
    content_type_for, default_bucket_name, object_key, ArtifactStore, StorageError,
};

/// Lifetime of the download links handed back to callers (7 days).
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Provider name reported for credentials taken from `BUCKET_*` variables.
const CREDENTIALS_PROVIDER: &str = "bucket-env";

pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: Option<String>,
}

impl S3ArtifactStore {
    /// Build a store from the worker's bucket settings.
    ///
    /// Static credentials are used when both key and secret are set;
    /// otherwise the default AWS credential chain applies.
    pub async fn from_config(config: &BucketConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint_url);

        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        tracing::info!(
            endpoint = %config.endpoint_url,
            bucket = config.bucket_name.as_deref().unwrap_or("<monthly>"),
            "External artifact store enabled",
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket_name.clone(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_image(&self, job_id: &str, path: &Path) -> Result<String, StorageError> {
        let bucket = resolve_bucket(self.bucket.as_deref(), Utc::now());
        let key = object_key(job_id, path);

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| StorageError::Read {
                path: path.display().to_string(),
                source,
            })?;

        self.client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .content_type(content_type_for(path))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(e).to_string()))?;

        let presigning = PresigningConfig::expires_in(PRESIGNED_URL_TTL)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(e).to_string()))?;

        tracing::info!(job_id, bucket = %bucket, key = %key, "Image uploaded to bucket");

        Ok(request.uri().to_string())
    }
}

/// Configured bucket, or the month bucket for `now`.
fn resolve_bucket(configured: Option<&str>, now: DateTime<Utc>) -> String {
    match configured {
        Some(name) => name.to_string(),
        None => default_bucket_name(now),
    }
}
