//! Id resolution with variant retries.
//!
//! External downloaders rewrite `_`/`-` and strip leading underscores from
//! output file names, so the raw id on disk is not always the real one. The
//! resolver tries, in order:
//!
//! 1. the id as found
//! 2. the id with `_` and `-` swapped
//! 3. the id prefixed with `_`
//!
//! The first variant that yields non-empty metadata is adopted as the item's
//! id. Exhausting all variants is not an error: the item continues without
//! metadata.

use std::sync::Arc;

use tracing::{debug, info, warn};

use vodvault_media::{FetchOptions, MetadataFetcher};
use vodvault_models::{watch_url, Resolution, VideoId, VideoMetadata};

use crate::error::{PipelineError, WorkerResult};
use crate::metrics;

/// Candidate ids in retry order, without duplicates.
pub fn id_variants(id: &VideoId) -> Vec<VideoId> {
    let mut variants: Vec<VideoId> = Vec::with_capacity(3);
    for candidate in [id.clone(), id.swapped_separators(), id.underscore_prefixed()] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

#[derive(Clone)]
pub struct IdResolver {
    fetcher: Arc<dyn MetadataFetcher>,
    options: FetchOptions,
}

impl IdResolver {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>, options: FetchOptions) -> Self {
        Self { fetcher, options }
    }

    pub async fn resolve(&self, id: &VideoId) -> Resolution {
        for candidate in id_variants(id) {
            match self.fetch(&candidate).await {
                Ok(metadata) => {
                    metrics::record_fetch_attempt(true);
                    if &candidate != id {
                        info!(item_id = %id, "Resolved as {}", candidate);
                    }
                    return Resolution {
                        id: candidate,
                        metadata: Some(metadata),
                    };
                }
                Err(e) => {
                    metrics::record_fetch_attempt(false);
                    debug!(item_id = %id, "{}", e);
                }
            }
        }

        warn!(item_id = %id, "No id variant yielded metadata, keeping the original name");
        Resolution::absent(id.clone())
    }

    async fn fetch(&self, candidate: &VideoId) -> WorkerResult<VideoMetadata> {
        let outcome = self
            .fetcher
            .fetch(&watch_url(candidate), &self.options)
            .await
            .map_err(|e| PipelineError::fetch(candidate.as_str(), e.to_string()))?;

        let errors = outcome.errors.join("; ");
        outcome.into_metadata().ok_or_else(|| {
            let message = if errors.is_empty() {
                "empty metadata".to_string()
            } else {
                errors
            };
            PipelineError::fetch(candidate.as_str(), message)
        })
    }
}
