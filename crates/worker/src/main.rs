//! `comfy-worker` -- synchronous job adapter for a local ComfyUI server.
//!
//! Takes one job at a time from the job queue, drives ComfyUI through
//! upload, submission and polling, and answers with a single JSON result
//! per job. Logs go to stderr; stdout carries results only.
//!
//! # Modes
//!
//! * `--test_input '<json>'` (or `TEST_INPUT`, or a `test_input.json` in
//!   the working directory): run one job and exit.
//! * Otherwise: read newline-delimited `{"id": ..., "input": ...}`
//!   requests from stdin until EOF.
//!
//! See [`WorkerConfig::from_env`] for the environment variables.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfy_worker::handler::JobHandler;
use comfy_worker::{runner, warmup};
use comfy_worker_core::config::WorkerConfig;

#[derive(Debug, Parser)]
#[command(name = "comfy-worker", version, about = "Run ComfyUI workflows as blocking jobs")]
struct Cli {
    /// Run a single job from this JSON and exit.
    #[arg(long = "test_input", env = "TEST_INPUT")]
    test_input: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(WorkerConfig::from_env()?);

    tracing::info!(
        comfy_url = %config.api_url(),
        output_dir = %config.output_dir.display(),
        poll_interval = ?config.poll.delay,
        poll_max_retries = config.poll.max_attempts,
        external_storage = config.bucket.is_some(),
        refresh_worker = config.refresh_worker,
        "Starting comfy-worker",
    );

    let handler = JobHandler::from_config(Arc::clone(&config)).await?;

    if config.warmup_on_start {
        match warmup::load_workflow(config.warmup_workflow.as_deref()).await {
            Ok(workflow) => {
                warmup::run(&handler, workflow).await;
            }
            Err(e) => tracing::warn!(error = %e, "Could not load warm-up workflow, skipping"),
        }
    }

    if let Some(raw) = local_test_input(cli.test_input).await? {
        let result = runner::run_test_input(&handler, &raw).await?;
        println!("{}", serde_json::to_string(&result)?);
        return Ok(());
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let processed =
        runner::run_lines(&handler, stdin, tokio::io::stdout(), config.job_concurrency).await?;

    tracing::info!(processed, "Job input closed, shutting down");
    Ok(())
}

/// Test input from the flag/env var, else from `test_input.json`.
async fn local_test_input(flag: Option<String>) -> anyhow::Result<Option<String>> {
    if flag.is_some() {
        return Ok(flag);
    }

    let path = Path::new(runner::TEST_INPUT_FILE);
    if tokio::fs::try_exists(path).await? {
        tracing::info!(path = %path.display(), "Found local test input file");
        return Ok(Some(tokio::fs::read_to_string(path).await?));
    }
    Ok(None)
}

/// Log to stderr, as JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "comfy_worker=info,comfy_worker_comfyui=info,comfy_worker_cloud=info".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
