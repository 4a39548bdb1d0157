//! Tier-aware upload to object storage.
//!
//! Objects in the archival tier cannot be overwritten in place. When the key
//! already exists there, the object is deleted and the key polled until it
//! disappears; a poll window that runs out re-issues the delete. Objects in
//! other tiers are overwritten directly.
//!
//! Every failure, the conflict protocol included, gets one retry of the
//! whole attempt.

use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use vodvault_storage::{ObjectStore, ObjectTags, Tier};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, WorkerResult};
use crate::metrics;
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Content type of video payloads.
pub const VIDEO_CONTENT_TYPE: &str = "video/x-matroska";

/// Content type of the ledger and its snapshot.
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Video payloads are archived; everything else stays hot.
pub fn tier_for_content_type(content_type: &str) -> Tier {
    if content_type == VIDEO_CONTENT_TYPE {
        Tier::Archive
    } else {
        Tier::Hot
    }
}

/// Object key for `path`: its path relative to `work_dir`, `/`-separated.
pub fn remote_key(work_dir: &Path, path: &Path) -> WorkerResult<String> {
    let relative = path.strip_prefix(work_dir).map_err(|_| {
        PipelineError::upload(format!(
            "{} is outside the work directory {}",
            path.display(),
            work_dir.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return Err(PipelineError::upload(format!(
            "{} does not name a file",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}

#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    config: Arc<PipelineConfig>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<PipelineConfig>) -> Self {
        Self { store, config }
    }

    /// Upload `path` and return its key.
    ///
    /// `tags` are stored both as object metadata and as the object's tag
    /// set. Video payloads are deleted locally once uploaded.
    pub async fn upload(
        &self,
        path: &Path,
        content_type: &str,
        tags: &ObjectTags,
    ) -> WorkerResult<String> {
        let key = remote_key(&self.config.work_dir, path)?;
        let tier = tier_for_content_type(content_type);

        let retry = self.retry_config(&key);

        debug!("Start upload {} => {} ({})", path.display(), key, tier);
        let started = Instant::now();

        let result = retry_async(&retry, || {
            let this = self.clone();
            let key = key.clone();
            let path = path.to_path_buf();
            let content_type = content_type.to_string();
            let tags = tags.clone();
            async move { this.attempt(&key, &path, &content_type, tier, &tags).await }
        })
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            RetryResult::Success(()) => metrics::record_upload(true, elapsed),
            RetryResult::Failed { error, attempts } => {
                metrics::record_upload(false, elapsed);
                warn!("Upload of {} failed after {} attempts: {}", key, attempts, error);
                return Err(error);
            }
        }

        info!("Finished upload {} ({:.1}s)", key, elapsed);

        if content_type == VIDEO_CONTENT_TYPE {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Uploaded but could not delete {}: {}", path.display(), e);
            }
        }

        Ok(key)
    }

    /// One retry, waiting exactly the configured delay.
    fn retry_config(&self, key: &str) -> RetryConfig {
        let delay = self.config.upload_retry_delay;
        RetryConfig::new(format!("Upload of {}", key))
            .with_max_retries(1)
            .with_base_delay(delay)
            .with_max_delay(delay)
    }

    async fn attempt(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        tier: Tier,
        tags: &ObjectTags,
    ) -> WorkerResult<()> {
        self.clear_conflict(key).await?;
        self.store
            .upload_file(key, path, content_type, tier, tags)
            .await?;
        if !tags.is_empty() {
            self.store.set_tags(key, tags).await?;
        }
        Ok(())
    }

    /// Make `key` safe to write: delete archived objects, let others be overwritten.
    async fn clear_conflict(&self, key: &str) -> WorkerResult<()> {
        if !self.store.exists(key).await? {
            return Ok(());
        }

        let tier = self.store.get_tier(key).await?;
        if !tier.is_archival() {
            warn!("{} already exists in the {} tier, overwriting", key, tier);
            return Ok(());
        }

        info!("{} already exists in the {} tier, deleting before upload", key, tier);
        loop {
            self.store
                .delete(key)
                .await
                .map_err(|e| PipelineError::UploadConflict(format!("{}: {}", key, e)))?;

            if self.wait_until_gone(key).await? {
                debug!("{} deleted", key);
                return Ok(());
            }

            warn!(
                "{} still exists after {:?}, deleting again",
                key, self.config.archive_poll_timeout
            );
        }
    }

    /// Poll until `key` is gone; false when the poll window runs out first.
    async fn wait_until_gone(&self, key: &str) -> WorkerResult<bool> {
        let deadline = Instant::now() + self.config.archive_poll_timeout;
        loop {
            if !self.store.exists(key).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config.archive_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, MemoryStore, StoreOp};
    use tempfile::TempDir;

    fn uploader(dir: &Path, store: Arc<MemoryStore>) -> Uploader {
        Uploader::new(store, Arc::new(test_config(dir)))
    }

    fn id_tags(id: &str) -> ObjectTags {
        ObjectTags::from([("id".to_string(), id.to_string())])
    }

    #[test]
    fn test_remote_key() {
        let work = Path::new("/tmp/backup-dl");
        assert_eq!(
            remote_key(work, Path::new("/tmp/backup-dl/UC1/20230101 T (a).mkv")).unwrap(),
            "UC1/20230101 T (a).mkv"
        );
        assert_eq!(
            remote_key(work, Path::new("/tmp/backup-dl/archive.txt")).unwrap(),
            "archive.txt"
        );
        assert!(remote_key(work, Path::new("/elsewhere/a.mkv")).is_err());
        assert!(remote_key(work, work).is_err());
    }

    #[test]
    fn test_tier_policy() {
        assert_eq!(tier_for_content_type(VIDEO_CONTENT_TYPE), Tier::Archive);
        assert_eq!(tier_for_content_type(TEXT_CONTENT_TYPE), Tier::Hot);
    }

    #[test]
    fn test_retry_delay_is_not_capped() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.upload_retry_delay = std::time::Duration::from_secs(30);
        let uploader = Uploader::new(Arc::new(MemoryStore::new()), Arc::new(config));

        let retry = uploader.retry_config("a.mkv");
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.delay_for_attempt(1), std::time::Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_video_upload_archives_tags_and_deletes_local() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("UC1").join("20230101 T (a).mkv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"video").unwrap();

        let store = Arc::new(MemoryStore::new());
        let key = uploader(dir.path(), store.clone())
            .upload(&path, VIDEO_CONTENT_TYPE, &id_tags("a"))
            .await
            .unwrap();

        assert_eq!(key, "UC1/20230101 T (a).mkv");
        let object = store.object(&key).unwrap();
        assert_eq!(object.tier, Tier::Archive);
        assert_eq!(object.bytes, b"video");
        assert_eq!(object.tags, id_tags("a"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_text_upload_overwrites_hot_and_keeps_local() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.txt");
        std::fs::write(&path, "youtube a\n").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.insert_text("archive.txt", "stale\n");

        uploader(dir.path(), store.clone())
            .upload(&path, TEXT_CONTENT_TYPE, &ObjectTags::new())
            .await
            .unwrap();

        assert_eq!(store.text("archive.txt").as_deref(), Some("youtube a\n"));
        assert!(!store.ops().contains(&StoreOp::Delete("archive.txt".into())));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_archived_object_is_deleted_and_polled_before_upload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mkv");
        std::fs::write(&path, b"new").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.insert("a.mkv", b"old".to_vec(), Tier::Archive);
        // The first delete is not observed within the poll window.
        store.linger_after_delete(1);

        let mut config = test_config(dir.path());
        config.archive_poll_timeout = std::time::Duration::ZERO;
        let uploader = Uploader::new(store.clone(), Arc::new(config));

        uploader
            .upload(&path, VIDEO_CONTENT_TYPE, &id_tags("a"))
            .await
            .unwrap();

        let ops = store.ops();
        let deletes = ops.iter().filter(|op| matches!(op, StoreOp::Delete(_))).count();
        assert_eq!(deletes, 2);
        let first_delete = ops.iter().position(|op| matches!(op, StoreOp::Delete(_))).unwrap();
        let upload = ops.iter().position(|op| matches!(op, StoreOp::Upload(_))).unwrap();
        assert!(first_delete < upload);
        assert_eq!(store.object("a.mkv").unwrap().bytes, b"new");
        assert_eq!(store.rejected_overwrites(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_is_retried() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mkv");
        std::fs::write(&path, b"video").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.fail_next_uploads(1);

        uploader(dir.path(), store.clone())
            .upload(&path, VIDEO_CONTENT_TYPE, &id_tags("a"))
            .await
            .unwrap();

        assert_eq!(store.upload_attempts(), 2);
        assert!(store.object("a.mkv").is_some());
    }

    #[tokio::test]
    async fn test_second_failure_is_terminal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mkv");
        std::fs::write(&path, b"video").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.fail_next_uploads(2);

        let result = uploader(dir.path(), store.clone())
            .upload(&path, VIDEO_CONTENT_TYPE, &id_tags("a"))
            .await;

        assert!(result.is_err());
        assert_eq!(store.upload_attempts(), 2);
        assert!(path.exists());
    }
}
