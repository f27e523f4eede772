//! Worker configuration loaded once from environment variables.
//!
//! The resulting [`WorkerConfig`] is never mutated after start-up. It is
//! shared read-only (behind an `Arc`) by every job the worker runs.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Host where ComfyUI listens.
pub const DEFAULT_COMFY_HOST: &str = "127.0.0.1:8188";

/// Delay between readiness probe attempts (ms).
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 50;

/// Readiness probe attempt ceiling.
pub const DEFAULT_PROBE_MAX_RETRIES: u32 = 5000;

/// Delay between history polls (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// History poll attempt ceiling.
pub const DEFAULT_POLL_MAX_RETRIES: u32 = 500;

/// Directory ComfyUI writes generated files into.
pub const DEFAULT_OUTPUT_PATH: &str = "/comfyui/output";

/// Per-request HTTP timeout (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Signing region used when `BUCKET_REGION` is unset.
pub const DEFAULT_BUCKET_REGION: &str = "us-east-1";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A fixed-interval attempt budget.
///
/// Used for both the readiness probe and result polling. The worst-case
/// wait is roughly `max_attempts * delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// What to do when the readiness probe exhausts its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessPolicy {
    /// Log a warning and carry on with upload/submission anyway.
    #[default]
    Lenient,
    /// End the job with a `BackendUnavailable` error.
    Strict,
}

/// What polling does when ComfyUI records an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionErrorPolicy {
    /// Keep polling until outputs appear or the budget runs out.
    #[default]
    Wait,
    /// End the job with an `ExecutionFailed` error straight away.
    FailFast,
}

/// Connection settings for the external artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    pub endpoint_url: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Fixed bucket name. When `None` the store picks a month bucket.
    pub bucket_name: Option<String>,
    pub region: String,
}

/// Immutable worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `host:port` or full base URL of the ComfyUI server.
    pub comfy_host: String,
    pub probe: RetryPolicy,
    pub poll: RetryPolicy,
    pub readiness: ReadinessPolicy,
    pub execution_errors: ExecutionErrorPolicy,
    pub output_dir: PathBuf,
    pub request_timeout: Duration,
    /// Echoed into every job result.
    pub refresh_worker: bool,
    /// Present when outputs should be persisted externally instead of
    /// being returned inline.
    pub bucket: Option<BucketConfig>,
    pub warmup_on_start: bool,
    /// Workflow file for the warm-up job; the bundled one when `None`.
    pub warmup_workflow: Option<PathBuf>,
    pub job_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            comfy_host: DEFAULT_COMFY_HOST.to_string(),
            probe: RetryPolicy::new(
                DEFAULT_PROBE_MAX_RETRIES,
                Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
            ),
            poll: RetryPolicy::new(
                DEFAULT_POLL_MAX_RETRIES,
                Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            ),
            readiness: ReadinessPolicy::Lenient,
            execution_errors: ExecutionErrorPolicy::Wait,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_PATH),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            refresh_worker: false,
            bucket: None,
            warmup_on_start: true,
            warmup_workflow: None,
            job_concurrency: 1,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                            | Default            |
    /// |------------------------------------|--------------------|
    /// | `COMFY_HOST`                       | `127.0.0.1:8188`   |
    /// | `COMFY_API_AVAILABLE_INTERVAL_MS`  | `50`               |
    /// | `COMFY_API_AVAILABLE_MAX_RETRIES`  | `5000`             |
    /// | `COMFY_POLLING_INTERVAL_MS`        | `250`              |
    /// | `COMFY_POLLING_MAX_RETRIES`        | `500`              |
    /// | `COMFY_OUTPUT_PATH`                | `/comfyui/output`  |
    /// | `COMFY_REQUEST_TIMEOUT_SECS`       | `30`               |
    /// | `COMFY_REQUIRE_READY`              | `false`            |
    /// | `COMFY_FAIL_ON_EXECUTION_ERROR`    | `false`            |
    /// | `REFRESH_WORKER`                   | `false`            |
    /// | `BUCKET_ENDPOINT_URL`              | unset              |
    /// | `BUCKET_ACCESS_KEY_ID`             | unset              |
    /// | `BUCKET_SECRET_ACCESS_KEY`         | unset              |
    /// | `BUCKET_NAME`                      | month bucket       |
    /// | `BUCKET_REGION`                    | `us-east-1`        |
    /// | `WARMUP_ON_START`                  | `true`             |
    /// | `WARMUP_WORKFLOW_PATH`             | bundled workflow   |
    /// | `JOB_CONCURRENCY`                  | `1`                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let comfy_host = get("COMFY_HOST").unwrap_or(defaults.comfy_host);

        let probe = RetryPolicy::new(
            parse_positive(&get, "COMFY_API_AVAILABLE_MAX_RETRIES", DEFAULT_PROBE_MAX_RETRIES)?,
            Duration::from_millis(parse_or(
                &get,
                "COMFY_API_AVAILABLE_INTERVAL_MS",
                DEFAULT_PROBE_INTERVAL_MS,
            )?),
        );

        let poll = RetryPolicy::new(
            parse_positive(&get, "COMFY_POLLING_MAX_RETRIES", DEFAULT_POLL_MAX_RETRIES)?,
            Duration::from_millis(parse_or(
                &get,
                "COMFY_POLLING_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
        );

        let readiness = if parse_bool(&get, "COMFY_REQUIRE_READY", false)? {
            ReadinessPolicy::Strict
        } else {
            ReadinessPolicy::Lenient
        };

        let execution_errors = if parse_bool(&get, "COMFY_FAIL_ON_EXECUTION_ERROR", false)? {
            ExecutionErrorPolicy::FailFast
        } else {
            ExecutionErrorPolicy::Wait
        };

        let output_dir = get("COMFY_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let request_timeout = Duration::from_secs(parse_positive(
            &get,
            "COMFY_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let bucket = get("BUCKET_ENDPOINT_URL").map(|endpoint_url| BucketConfig {
            endpoint_url,
            access_key_id: get("BUCKET_ACCESS_KEY_ID"),
            secret_access_key: get("BUCKET_SECRET_ACCESS_KEY"),
            bucket_name: get("BUCKET_NAME"),
            region: get("BUCKET_REGION").unwrap_or_else(|| DEFAULT_BUCKET_REGION.to_string()),
        });

        Ok(Self {
            comfy_host,
            probe,
            poll,
            readiness,
            execution_errors,
            output_dir,
            request_timeout,
            refresh_worker: parse_bool(&get, "REFRESH_WORKER", false)?,
            bucket,
            warmup_on_start: parse_bool(&get, "WARMUP_ON_START", true)?,
            warmup_workflow: get("WARMUP_WORKFLOW_PATH").map(PathBuf::from),
            job_concurrency: parse_positive(&get, "JOB_CONCURRENCY", 1)?,
        })
    }

    /// Base HTTP URL of the ComfyUI server, without a trailing slash.
    pub fn api_url(&self) -> String {
        let host = self.comfy_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected: "unsigned integer",
            value: raw,
        }),
    }
}

fn parse_positive<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, var, default)?;
    if value == T::default() {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}

fn parse_bool<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                expected: "boolean",
                value: raw,
            }),
        },
    }
}
