//! Tiered object storage.
//!
//! This crate provides:
//! - The `ObjectStore` interface the pipeline uploads through
//! - The `Tier` model (hot / cool / archive)
//! - An S3-compatible implementation mapping tiers onto storage classes

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::{ObjectStore, ObjectTags, Tier};
