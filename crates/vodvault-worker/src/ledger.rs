//! Durable record of completed items.
//!
//! The ledger is a newline-delimited list of `youtube <id>` records kept in
//! object storage under [`LEDGER_KEY`] and mirrored in the work directory.
//! Three local files are involved:
//!
//! - `archive.txt`: the ledger itself; only completed uploads are appended
//! - `archive_ytdl.txt`: the downloader's archive; the ledger plus every id
//!   claimed in this run, so payloads awaiting upload are not downloaded again
//! - `archive_old.txt`: the ledger as pulled, uploaded once as a backup
//!
//! Appends and the re-upload that follows them run under one async mutex, so
//! records are never torn or reordered and every upload carries all earlier
//! records.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vodvault_models::{LedgerRecord, VideoId};
use vodvault_storage::{ObjectStore, ObjectTags};

use crate::config::{LEDGER_FILE, SNAPSHOT_LEDGER_FILE, WORKING_LEDGER_FILE};
use crate::error::{PipelineError, WorkerResult};
use crate::uploader::{Uploader, TEXT_CONTENT_TYPE};

/// Remote key of the ledger.
pub const LEDGER_KEY: &str = LEDGER_FILE;

pub struct Ledger {
    store: Arc<dyn ObjectStore>,
    uploader: Uploader,
    work_dir: PathBuf,
    completed: Mutex<HashSet<VideoId>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn ObjectStore>, uploader: Uploader, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            uploader,
            work_dir: work_dir.into(),
            completed: Mutex::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.work_dir.join(LEDGER_FILE)
    }

    pub fn working_copy_path(&self) -> PathBuf {
        self.work_dir.join(WORKING_LEDGER_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.work_dir.join(SNAPSHOT_LEDGER_FILE)
    }

    /// Pull the remote ledger and derive the working copy and snapshot.
    ///
    /// Returns the number of completed ids known.
    pub async fn pull(&self) -> WorkerResult<usize> {
        let mut completed = self.completed.lock().await;
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let ledger_path = self.path();
        let remote_exists = self.store.exists(LEDGER_KEY).await?;
        if remote_exists {
            self.store.download_file(LEDGER_KEY, &ledger_path).await?;
            ensure_trailing_newline(&ledger_path).await?;
        } else {
            info!("No remote ledger, starting an empty one");
            tokio::fs::write(&ledger_path, b"").await?;
        }

        *completed = read_records(&ledger_path).await?;

        tokio::fs::copy(&ledger_path, self.working_copy_path()).await?;

        if remote_exists {
            let snapshot = self.snapshot_path();
            tokio::fs::copy(&ledger_path, &snapshot).await?;
            if let Err(e) = self
                .uploader
                .upload(&snapshot, TEXT_CONTENT_TYPE, &ObjectTags::new())
                .await
            {
                warn!("Ledger snapshot upload failed, continuing without backup: {}", e);
            }
        }

        info!("Ledger pulled: {} completed item(s)", completed.len());
        Ok(completed.len())
    }

    pub async fn contains(&self, id: &VideoId) -> bool {
        self.completed.lock().await.contains(id)
    }

    /// Add ids claimed in this run to the downloader's archive.
    pub async fn mark_in_progress(&self, ids: &[VideoId]) -> WorkerResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let _guard = self.completed.lock().await;
        let lines: String = ids
            .iter()
            .map(|id| LedgerRecord::new(id.clone()).to_line())
            .collect();
        append_text(&self.working_copy_path(), &lines).await?;

        debug!("Marked {} id(s) in progress", ids.len());
        Ok(())
    }

    /// Record `id` as completed and push the ledger.
    ///
    /// Returns false when `id` was already recorded. A failed push is logged
    /// and left to the next append.
    pub async fn append(&self, id: &VideoId) -> WorkerResult<bool> {
        let mut completed = self.completed.lock().await;
        if completed.contains(id) {
            debug!(item_id = %id, "Already in ledger");
            return Ok(false);
        }

        append_text(&self.path(), &LedgerRecord::new(id.clone()).to_line())
            .await
            .map_err(|e| PipelineError::ledger(format!("Failed to append {}: {}", id, e)))?;
        completed.insert(id.clone());

        if let Err(e) = self
            .uploader
            .upload(&self.path(), TEXT_CONTENT_TYPE, &ObjectTags::new())
            .await
        {
            warn!(item_id = %id, "Ledger push failed, will retry on next append: {}", e);
        }

        Ok(true)
    }
}

/// Ids in a ledger file; blank and malformed lines are ignored.
pub async fn read_records(path: &Path) -> WorkerResult<HashSet<VideoId>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.parse::<LedgerRecord>() {
            Ok(record) => Some(record.id),
            Err(e) => {
                debug!("Ignoring ledger line: {}", e);
                None
            }
        })
        .collect())
}

/// Records are appended as whole lines, so the last line must be terminated.
async fn ensure_trailing_newline(path: &Path) -> std::io::Result<()> {
    let content = tokio::fs::read(path).await?;
    if content.last().is_some_and(|byte| *byte != b'\n') {
        append_text(path, "\n").await?;
    }
    Ok(())
}

/// One `write` on a file opened for appending.
async fn append_text(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}
