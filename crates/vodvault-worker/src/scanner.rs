//! Work directory scanner.
//!
//! Lists downloaded payloads and classifies each by filename:
//!
//! - **final form**: `<date> <title> (<id>).mkv`, left over from a run that
//!   was interrupted after renaming; goes straight to upload
//! - **raw form**: `<id>.mkv`, fresh from the downloader
//!
//! Ids already in the ledger or already claimed in this run are skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use vodvault_models::{FileForm, MediaItem, VideoId};

use crate::error::{PipelineError, WorkerResult};
use crate::ledger::Ledger;

/// Stem of a final-form file: anything, a space, then the id in parentheses.
const FINAL_FORM_PATTERN: &str = r"^(?P<prefix>.*)\s\((?P<id>[^()\s]+)\)$";

/// Ids claimed by a chain during the current run.
#[derive(Debug, Default)]
pub struct SessionClaims {
    claimed: HashSet<VideoId>,
}

impl SessionClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`; false when it was already claimed.
    pub fn claim(&mut self, id: &VideoId) -> bool {
        self.claimed.insert(id.clone())
    }

    pub fn is_claimed(&self, id: &VideoId) -> bool {
        self.claimed.contains(id)
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    work_dir: PathBuf,
    extension: String,
    final_form: Regex,
}

impl Scanner {
    pub fn new(work_dir: impl Into<PathBuf>, extension: impl Into<String>) -> WorkerResult<Self> {
        let final_form = Regex::new(FINAL_FORM_PATTERN)
            .map_err(|e| PipelineError::config(format!("Invalid final-form pattern: {}", e)))?;

        Ok(Self {
            work_dir: work_dir.into(),
            extension: extension.into(),
            final_form,
        })
    }

    /// Id and form of a payload, from its file name alone.
    pub fn classify(&self, path: &Path) -> Option<(VideoId, FileForm)> {
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() {
            return None;
        }

        match self.final_form.captures(stem) {
            Some(caps) => Some((VideoId::from(&caps["id"]), FileForm::Final)),
            None => Some((VideoId::from(stem), FileForm::Raw)),
        }
    }

    /// Payload files under the work directory, in sorted path order.
    ///
    /// Hidden entries (in-flight enrichment outputs among them) are skipped.
    pub fn list_candidates(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.work_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(DirEntry::into_path)
            .filter(|path| self.has_payload_extension(path))
            .collect()
    }

    /// New items for this pass.
    ///
    /// Every returned id is claimed in `claims`; ids present in the ledger
    /// are claimed too so later passes do not look at them again.
    pub async fn scan(&self, claims: &mut SessionClaims, ledger: &Ledger) -> Vec<MediaItem> {
        let mut items = Vec::new();

        for path in self.list_candidates() {
            let Some((id, form)) = self.classify(&path) else {
                debug!("Unrecognised file name, skipping: {}", path.display());
                continue;
            };

            if claims.is_claimed(&id) {
                debug!(item_id = %id, "Already claimed in this run: {}", path.display());
                continue;
            }
            claims.claim(&id);

            if ledger.contains(&id).await {
                debug!(item_id = %id, "Already in ledger, skipping: {}", path.display());
                continue;
            }

            items.push(MediaItem::discovered(id, path, form));
        }

        info!(
            "Scan found {} new item(s) under {}",
            items.len(),
            self.work_dir.display()
        );
        items
    }

    fn has_payload_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map_or(false, |name| name.starts_with('.'))
}
