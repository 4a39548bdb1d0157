//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Metadata fetch failed for {id}: {message}")]
    Fetch { id: String, message: String },

    #[error("Enrichment failed: {0}")]
    Enrich(String),

    #[error("Path too long: {}", .0.display())]
    PathTooLong(PathBuf),

    #[error("Upload conflict on {0}")]
    UploadConflict(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vodvault_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vodvault_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn fetch(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn enrich(msg: impl Into<String>) -> Self {
        Self::Enrich(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
