//! Shared data models for the vodvault pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video ids and the metadata resolved for them
//! - Discovered media items and their pipeline state
//! - Per-stage and per-item pipeline outcomes
//! - The ledger record wire format

pub mod item;
pub mod ledger;
pub mod outcome;
pub mod video;

// Re-export common types
pub use item::{FileForm, ItemState, MediaItem};
pub use ledger::{LedgerRecord, LedgerRecordError, LEDGER_SOURCE};
pub use outcome::{ItemOutcome, PipelineResult, Resolution, RunSummary, StageOutcome};
pub use video::{watch_url, VideoId, VideoMetadata};
