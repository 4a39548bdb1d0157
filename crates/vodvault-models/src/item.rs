//! Discovered media items and their pipeline state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::video::{VideoId, VideoMetadata};

/// Shape of a discovered filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileForm {
    /// Bare `<id><ext>` straight from the downloader
    Raw,
    /// `<date> <title> (<id>)<ext>`, already renamed by a previous run
    Final,
}

/// Pipeline state of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Discovered,
    Resolving,
    Planning,
    Enriching,
    ReadyToUpload,
    Uploading,
    Completed,
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Discovered => "discovered",
            ItemState::Resolving => "resolving",
            ItemState::Planning => "planning",
            ItemState::Enriching => "enriching",
            ItemState::ReadyToUpload => "ready_to_upload",
            ItemState::Uploading => "uploading",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
        }
    }

    /// Whether the item has reached `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Failed)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A media file discovered in the work directory.
///
/// Owned by exactly one item chain; each stage mutates it in turn.
#[derive(Debug, Clone)]
pub struct MediaItem {
    /// Working id (may be replaced by a corrected variant during resolution)
    pub id: VideoId,
    /// Path the file was discovered at
    pub original_path: PathBuf,
    /// Current location of the payload
    pub path: PathBuf,
    /// Filename shape at discovery time
    pub form: FileForm,
    /// Metadata resolved for the item, if any
    pub metadata: Option<VideoMetadata>,
    /// Current pipeline state
    pub state: ItemState,
}

impl MediaItem {
    /// Create a freshly discovered item.
    pub fn discovered(id: VideoId, path: impl Into<PathBuf>, form: FileForm) -> Self {
        let path = path.into();
        Self {
            id,
            original_path: path.clone(),
            path,
            form,
            metadata: None,
            state: ItemState::Discovered,
        }
    }

    /// Move the item to a new state.
    pub fn advance(&mut self, state: ItemState) {
        self.state = state;
    }

    pub fn duration(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.duration)
    }
}
