//! Job-queue boundary.
//!
//! Feeds [`JobRequest`]s to a [`JobHandler`] and writes one JSON
//! [`JobResult`] per job. Two modes: a single local test input, or a
//! stream of newline-delimited requests with results emitted in input
//! order.

use std::pin::pin;

use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use comfy_worker_core::error::WorkerError;
use comfy_worker_core::job::{JobRequest, JobResult, RawInput};

use crate::handler::JobHandler;

/// Job ID used for local test inputs that do not carry one.
pub const TEST_JOB_ID: &str = "local-test";

/// Local test input file picked up from the working directory.
pub const TEST_INPUT_FILE: &str = "test_input.json";

#[derive(Debug, Deserialize)]
struct TestInput {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    input: RawInput,
}

/// Parse a local test input (`{"input": ...}`, `id` optional).
pub fn parse_test_input(raw: &str) -> Result<JobRequest, serde_json::Error> {
    let test: TestInput = serde_json::from_str(raw)?;
    Ok(JobRequest {
        id: test.id.unwrap_or_else(|| TEST_JOB_ID.to_string()),
        input: test.input,
    })
}

/// Run a single local test job.
pub async fn run_test_input(handler: &JobHandler, raw: &str) -> Result<JobResult, serde_json::Error> {
    let job = parse_test_input(raw)?;
    tracing::info!(job_id = %job.id, "Running local test input");
    Ok(handler.handle(job).await)
}

/// Read newline-delimited job requests from `reader` until EOF and write
/// one result line per request to `writer`.
///
/// Up to `concurrency` jobs are in flight at once; results are written
/// in the order requests arrived. Returns the number of results written.
/// A read error (e.g. a line that is not UTF-8) is returned after the
/// results of every request read before it.
pub async fn run_lines<R, W>(
    handler: &JobHandler,
    reader: R,
    mut writer: W,
    concurrency: usize,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let lines = futures::stream::try_unfold(reader.lines(), |mut lines| async move {
        let next = lines.next_line().await?;
        Ok::<_, std::io::Error>(next.map(|line| (line, lines)))
    });

    let mut results = pin!(lines
        .try_filter(|line| futures::future::ready(!line.trim().is_empty()))
        .map(move |line| async move {
            match line {
                Ok(line) => Ok(handle_line(handler, line).await),
                Err(e) => Err(e),
            }
        })
        .buffered(concurrency.max(1)));

    let mut written = 0;
    while let Some(result) = results.next().await {
        let result = result.inspect_err(|e| {
            tracing::error!(error = %e, written, "Failed to read job input");
        })?;
        let mut json = serde_json::to_vec(&result)?;
        json.push(b'\n');
        writer.write_all(&json).await?;
        writer.flush().await?;
        written += 1;
    }

    Ok(written)
}

async fn handle_line(handler: &JobHandler, line: String) -> JobResult {
    match serde_json::from_str::<JobRequest>(&line) {
        Ok(job) => handler.handle(job).await,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed job request");
            let err = WorkerError::InputValidation(format!("Invalid job request: {e}"));
            JobResult::failure(&err, handler.config().refresh_worker)
        }
    }
}
