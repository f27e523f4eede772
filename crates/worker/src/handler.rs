//! Per-job orchestration.
//!
//! [`JobHandler::handle`] walks one job through
//! `Validating -> Probing -> Uploading -> Submitting -> Polling ->
//! Materializing` strictly in sequence and turns the outcome into a
//! single [`JobResult`]. The handler holds no per-job state, so one
//! instance can serve concurrent jobs.

use std::fmt;
use std::sync::Arc;

use tracing::Instrument;

use comfy_worker_cloud::S3ArtifactStore;
use comfy_worker_comfyui::api::ComfyUIApi;
use comfy_worker_comfyui::polling::{poll_until_complete, submit};
use comfy_worker_comfyui::readiness::ensure_ready;
use comfy_worker_comfyui::upload::upload_images;
use comfy_worker_core::config::WorkerConfig;
use comfy_worker_core::error::WorkerError;
use comfy_worker_core::job::{JobRequest, JobResult, OutputArtifact, RawInput};
use comfy_worker_core::storage::ArtifactStore;
use comfy_worker_core::validation::validate_input;

use crate::output::materialize;

/// Pipeline stage a job is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Probing,
    Uploading,
    Submitting,
    Polling,
    Materializing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Probing => "probing",
            Stage::Uploading => "uploading",
            Stage::Submitting => "submitting",
            Stage::Polling => "polling",
            Stage::Materializing => "materializing",
        };
        f.write_str(name)
    }
}

/// A terminal error together with the stage that produced it.
#[derive(Debug)]
pub struct JobFailure {
    pub stage: Stage,
    pub error: WorkerError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, JobFailure>;
}

impl<T> AtStage<T> for Result<T, WorkerError> {
    fn at(self, stage: Stage) -> Result<T, JobFailure> {
        self.map_err(|error| JobFailure { stage, error })
    }
}

/// Runs jobs against one ComfyUI instance.
pub struct JobHandler {
    config: Arc<WorkerConfig>,
    api: ComfyUIApi,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl JobHandler {
    pub fn new(
        config: Arc<WorkerConfig>,
        api: ComfyUIApi,
        store: Option<Arc<dyn ArtifactStore>>,
    ) -> Self {
        Self { config, api, store }
    }

    /// Build the HTTP client and, when a bucket endpoint is configured,
    /// the external artifact store.
    pub async fn from_config(config: Arc<WorkerConfig>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let api = ComfyUIApi::with_client(client, config.api_url());

        let store = match &config.bucket {
            Some(bucket) => {
                let s3 = S3ArtifactStore::from_config(bucket).await;
                Some(Arc::new(s3) as Arc<dyn ArtifactStore>)
            }
            None => None,
        };

        Ok(Self::new(config, api, store))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process one job and return its result. Never panics on job errors.
    pub async fn handle(&self, job: JobRequest) -> JobResult {
        let span = tracing::info_span!("job", job_id = %job.id);
        let refresh_worker = self.config.refresh_worker;

        async move {
            match self.run(&job.id, job.input).await {
                Ok(images) => {
                    tracing::info!(images = images.len(), "Job finished");
                    JobResult::success(images, refresh_worker)
                }
                Err(failure) => {
                    tracing::error!(
                        stage = %failure.stage,
                        error = %failure.error,
                        "Job failed",
                    );
                    JobResult::failure(&failure.error, refresh_worker)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// The job pipeline proper.
    pub async fn run(
        &self,
        job_id: &str,
        input: RawInput,
    ) -> Result<Vec<OutputArtifact>, JobFailure> {
        let input = validate_input(input).at(Stage::Validating)?;

        ensure_ready(&self.api, &self.config.probe, self.config.readiness)
            .await
            .at(Stage::Probing)?;

        upload_images(&self.api, &input.images)
            .await
            .at(Stage::Uploading)?;

        let prompt_id = submit(&self.api, &input.workflow)
            .await
            .at(Stage::Submitting)?;

        let entry = poll_until_complete(
            &self.api,
            &prompt_id,
            &self.config.poll,
            self.config.execution_errors,
        )
        .await
        .at(Stage::Polling)?;

        materialize(&entry, job_id, &self.config.output_dir, self.store.as_deref())
            .await
            .at(Stage::Materializing)
    }
}
