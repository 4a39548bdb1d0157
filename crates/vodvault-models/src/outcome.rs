//! Stage and item outcomes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::video::{VideoId, VideoMetadata};

/// Result of id resolution: the working id and its metadata, if any variant
/// produced some.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub id: VideoId,
    pub metadata: Option<VideoMetadata>,
}

impl Resolution {
    /// Resolution that found nothing for `id`.
    pub fn absent(id: VideoId) -> Self {
        Self { id, metadata: None }
    }

    pub fn is_resolved(&self) -> bool {
        self.metadata.is_some()
    }
}

/// Value produced by one step of an item chain.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Id resolution finished (possibly with absent metadata)
    Resolved(Resolution),
    /// The payload now lives at this path
    Planned(PathBuf),
    /// Enrichment finished for the payload at this path
    Enriched(PathBuf),
    /// Upload and ledger append succeeded; final local path
    Uploaded(PathBuf),
    /// Terminal failure with its cause
    Failed(String),
}

/// Terminal outcome of an item chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Completed,
    Failed,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Completed => "completed",
            ItemOutcome::Failed => "failed",
        }
    }
}

/// Per-item result reported back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    /// Id used for the ledger entry (possibly a corrected variant)
    pub id: VideoId,
    pub outcome: ItemOutcome,
    /// Local path of the payload when the chain ended
    pub final_path: Option<PathBuf>,
    /// Failure cause for `Failed` results
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn completed(id: VideoId, final_path: PathBuf) -> Self {
        Self {
            id,
            outcome: ItemOutcome::Completed,
            final_path: Some(final_path),
            error: None,
        }
    }

    pub fn failed(id: VideoId, final_path: Option<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            id,
            outcome: ItemOutcome::Failed,
            final_path,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == ItemOutcome::Completed
    }
}

/// Results of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub results: Vec<PipelineResult>,
}

impl RunSummary {
    pub fn extend(&mut self, results: impl IntoIterator<Item = PipelineResult>) {
        self.results.extend(results);
    }

    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.completed()
    }

    /// Ids of the items that failed, in result order.
    pub fn failed_ids(&self) -> Vec<&VideoId> {
        self.results
            .iter()
            .filter(|r| !r.is_completed())
            .map(|r| &r.id)
            .collect()
    }
}
