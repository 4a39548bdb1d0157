//! Structured item logging utilities.
//!
//! Provides consistent, structured logging for item chains with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use vodvault_models::{ItemState, VideoId};

/// Item logger for structured logging with consistent formatting.
///
/// Every event carries the item id and the stage currently owning the item.
#[derive(Debug, Clone)]
pub struct ItemLogger {
    item_id: String,
    stage: String,
}

impl ItemLogger {
    /// Create a new logger for an item in the given state.
    pub fn new(item_id: &VideoId, state: ItemState) -> Self {
        Self {
            item_id: item_id.to_string(),
            stage: state.as_str().to_string(),
        }
    }

    /// Same item, different stage.
    pub fn at(&self, state: ItemState) -> Self {
        Self {
            item_id: self.item_id.clone(),
            stage: state.as_str().to_string(),
        }
    }

    /// Follow an id correction made by the resolver.
    pub fn with_id(&self, item_id: &VideoId) -> Self {
        Self {
            item_id: item_id.to_string(),
            stage: self.stage.clone(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Item completed: {}", message
        );
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Span entered for the whole chain of this item.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("item", item_id = %self.item_id)
    }
}
