//! Final file naming.
//!
//! A resolved item is renamed to `{YYYYMMDD} {title} ({id}).{ext}` next to
//! the source file. The title is sanitized and truncated to keep the full
//! path under the configured ceiling; when the rename still fails for being
//! too long, one retry is made at half the truncation budget before the
//! original name is kept.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use vodvault_media::{is_name_too_long_error, move_file, MediaError};
use vodvault_models::{MediaItem, VideoId, VideoMetadata};

use crate::error::{PipelineError, WorkerResult};

/// Date used when the upload date is unknown.
pub const FALLBACK_DATE: &str = "19700101";

/// Characters removed from titles on top of control characters.
const FORBIDDEN_TITLE_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/', '.'];

/// Strip characters that are not allowed (or not wanted) in file names.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_control() && !FORBIDDEN_TITLE_CHARS.contains(c))
        .collect()
}

/// Keep at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Target name for `source` with the title truncated to `title_budget` characters.
pub fn target_path(
    source: &Path,
    id: &VideoId,
    metadata: &VideoMetadata,
    title_budget: usize,
) -> PathBuf {
    let date = metadata
        .upload_date
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_else(|| FALLBACK_DATE.to_string());
    let title = truncate_chars(
        &sanitize_title(metadata.title.as_deref().unwrap_or_default()),
        title_budget,
    );
    let extension = source
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let file_name = format!("{} {} ({}){}", date, title, id, extension);
    match source.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[derive(Debug, Clone)]
pub struct PathPlanner {
    title_max_length: usize,
    path_max_length: usize,
}

impl PathPlanner {
    pub fn new(title_max_length: usize, path_max_length: usize) -> Self {
        Self {
            title_max_length,
            path_max_length,
        }
    }

    /// Rename the item's payload to its final name and return the new path.
    ///
    /// Items without metadata keep their current path. The returned path
    /// always exists on disk when this returns `Ok`.
    pub async fn plan(&self, item: &MediaItem) -> WorkerResult<PathBuf> {
        let Some(metadata) = &item.metadata else {
            debug!(item_id = %item.id, "No metadata, keeping {}", item.path.display());
            return Ok(item.path.clone());
        };

        let mut budget = self.title_max_length;
        for attempt in 0..2 {
            let target = target_path(&item.path, &item.id, metadata, budget);
            if target == item.path {
                return Ok(target);
            }

            match self.rename(&item.path, &target).await {
                Ok(()) => {
                    info!(
                        item_id = %item.id,
                        "Renamed {} => {}",
                        item.path.display(),
                        target.display()
                    );
                    return Ok(target);
                }
                Err(PipelineError::PathTooLong(_)) if attempt == 0 => {
                    budget /= 2;
                    warn!(
                        item_id = %item.id,
                        "Path too long, retrying with a {}-character title",
                        budget
                    );
                }
                Err(PipelineError::PathTooLong(path)) => {
                    warn!(
                        item_id = %item.id,
                        "Path still too long ({}), keeping the original name",
                        path.display()
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(item.path.clone())
    }

    async fn rename(&self, from: &Path, to: &Path) -> WorkerResult<()> {
        if to.to_string_lossy().chars().count() > self.path_max_length {
            return Err(PipelineError::PathTooLong(to.to_path_buf()));
        }

        move_file(from, to).await.map_err(|e| match e {
            MediaError::Io(io) if is_name_too_long_error(&io) => {
                PipelineError::PathTooLong(to.to_path_buf())
            }
            other => PipelineError::from(other),
        })
    }
}
