//! Shared types for the ComfyUI job worker.
//!
//! Holds the immutable worker configuration, the job data model seen at
//! the job-queue boundary, input validation, the terminal error kinds a
//! job can end in, and the artifact-store seam used to persist outputs
//! outside the worker.

pub mod config;
pub mod error;
pub mod job;
pub mod storage;
pub mod validation;
