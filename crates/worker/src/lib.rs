//! `comfy-worker` library crate.
//!
//! Re-exports the job pipeline for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod handler;
pub mod output;
pub mod runner;
pub mod warmup;
