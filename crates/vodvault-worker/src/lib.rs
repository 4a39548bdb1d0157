//! Post-processing and upload pipeline for downloaded videos.
//!
//! This crate provides:
//! - Work directory scanning with ledger-based dedup
//! - Id resolution with variant retries
//! - Final file naming and best-effort metadata embedding
//! - Tier-aware upload with a resumable ledger
//! - A per-item state machine driven by the orchestrator

pub mod config;
pub mod context;
pub mod enricher;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod resolver;
pub mod retry;
pub mod scanner;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, WorkerResult};
pub use ledger::Ledger;
pub use logging::ItemLogger;
pub use orchestrator::Orchestrator;
