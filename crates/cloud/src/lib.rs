//! External artifact storage for generated images.
//!
//! [`S3ArtifactStore`] implements the core
//! [`ArtifactStore`](comfy_worker_core::storage::ArtifactStore) trait
//! against any S3-compatible endpoint.

pub mod s3;

pub use s3::S3ArtifactStore;
