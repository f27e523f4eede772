//! ComfyUI REST client and job stages.
//!
//! Provides the HTTP API wrapper, the bounded-retry combinator, and the
//! stages a job walks through against the backend: readiness probing,
//! input image upload, workflow submission and history polling.

pub mod api;
pub mod history;
pub mod polling;
pub mod readiness;
pub mod retry;
pub mod upload;
