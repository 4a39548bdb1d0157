//! In-memory collaborators for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use vodvault_media::{
    DownloadRequest, FetchOptions, FetchOutcome, MediaDownloader, MediaError, MediaResult,
    MetadataFetcher, ProcessOutput, RemuxRequest, Remuxer,
};
use vodvault_models::VideoMetadata;
use vodvault_storage::{ObjectStore, ObjectTags, StorageError, StorageResult, Tier};

use crate::config::PipelineConfig;
use crate::context::PipelineContext;

const WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Config rooted at `dir` with every wait set to zero.
pub fn test_config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        sources: vec!["https://www.youtube.com/channel/UCtest".to_string()],
        work_dir: dir.to_path_buf(),
        archive_poll_interval: Duration::ZERO,
        archive_poll_timeout: Duration::ZERO,
        upload_retry_delay: Duration::ZERO,
        ..Default::default()
    }
}

/// Context over `store` with fresh fakes for every other collaborator.
pub fn test_context(dir: &Path, store: Arc<MemoryStore>) -> PipelineContext {
    PipelineContext::new(
        test_config(dir),
        Arc::new(ScriptedFetcher::new()),
        Arc::new(FakeRemuxer::new()),
        Arc::new(FakeDownloader::new(dir)),
        store,
        None,
    )
}

/// Metadata with every consumed field filled in.
pub fn metadata(title: &str, date: &str) -> VideoMetadata {
    VideoMetadata {
        id: None,
        title: Some(title.to_string()),
        uploader: Some("Uploader".to_string()),
        upload_date: NaiveDate::parse_from_str(date, "%Y%m%d").ok(),
        description: Some("Description".to_string()),
        duration: Some(123.0),
    }
}

/// A context plus typed handles on its fakes.
pub struct Harness {
    pub ctx: PipelineContext,
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub remuxer: Arc<FakeRemuxer>,
    pub downloader: Arc<FakeDownloader>,
}

impl Harness {
    pub fn new(dir: &Path) -> Self {
        Self::with_config(test_config(dir))
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let remuxer = Arc::new(FakeRemuxer::new());
        let downloader = Arc::new(FakeDownloader::new(&config.work_dir));

        let ctx = PipelineContext::new(
            config,
            fetcher.clone(),
            remuxer.clone(),
            downloader.clone(),
            store.clone(),
            None,
        );

        Self {
            ctx,
            store,
            fetcher,
            remuxer,
            downloader,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub tier: Tier,
    pub content_type: String,
    pub tags: ObjectTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists(String),
    GetTier(String),
    Delete(String),
    Upload(String),
    SetTags(String),
    Download(String),
}

/// [`ObjectStore`] over a map, with failure and eventual-consistency knobs.
///
/// Uploading over an archived object is refused, the way an archival tier
/// refuses in-place overwrites.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    lingering: Mutex<HashMap<String, usize>>,
    ops: Mutex<Vec<StoreOp>>,
    failing_uploads: AtomicUsize,
    linger_on_delete: AtomicUsize,
    upload_attempts: AtomicUsize,
    rejected_overwrites: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>, tier: Tier) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                tier,
                content_type: "application/octet-stream".to_string(),
                tags: ObjectTags::new(),
            },
        );
    }

    pub fn insert_text(&self, key: &str, text: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes: text.as_bytes().to_vec(),
                tier: Tier::Hot,
                content_type: "text/plain".to_string(),
                tags: ObjectTags::new(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.object(key)
            .map(|o| String::from_utf8_lossy(&o.bytes).to_string())
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Keys uploaded so far, in order, including failed attempts.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Upload(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Make the next `n` uploads fail.
    pub fn fail_next_uploads(&self, n: usize) {
        self.failing_uploads.store(n, Ordering::SeqCst);
    }

    /// After the next archival delete, report the key present for `n` more checks.
    pub fn linger_after_delete(&self, n: usize) {
        self.linger_on_delete.store(n, Ordering::SeqCst);
    }

    pub fn upload_attempts(&self) -> usize {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    pub fn rejected_overwrites(&self) -> usize {
        self.rejected_overwrites.load(Ordering::SeqCst)
    }

    fn record(&self, op: StoreOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn is_lingering(&self, key: &str) -> bool {
        self.lingering.lock().unwrap().get(key).copied().unwrap_or(0) > 0
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.record(StoreOp::Exists(key.to_string()));
        if self.objects.lock().unwrap().contains_key(key) {
            return Ok(true);
        }

        let mut lingering = self.lingering.lock().unwrap();
        match lingering.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_tier(&self, key: &str) -> StorageResult<Tier> {
        self.record(StoreOp::GetTier(key.to_string()));
        if let Some(object) = self.objects.lock().unwrap().get(key) {
            return Ok(object.tier);
        }
        if self.is_lingering(key) {
            return Ok(Tier::Archive);
        }
        Err(StorageError::not_found(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.record(StoreOp::Delete(key.to_string()));
        let removed = self.objects.lock().unwrap().remove(key);
        if removed.is_some_and(|o| o.tier.is_archival()) {
            let linger = self.linger_on_delete.swap(0, Ordering::SeqCst);
            if linger > 0 {
                self.lingering.lock().unwrap().insert(key.to_string(), linger);
            }
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        tier: Tier,
        metadata: &ObjectTags,
    ) -> StorageResult<()> {
        self.record(StoreOp::Upload(key.to_string()));
        self.upload_attempts.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::upload_failed("injected failure"));
        }

        let archived = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|o| o.tier.is_archival());
        if archived || self.is_lingering(key) {
            self.rejected_overwrites.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::upload_failed(format!(
                "{} is archived and cannot be overwritten",
                key
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                tier,
                content_type: content_type.to_string(),
                tags: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn set_tags(&self, key: &str, tags: &ObjectTags) -> StorageResult<()> {
        self.record(StoreOp::SetTags(key.to_string()));
        match self.objects.lock().unwrap().get_mut(key) {
            Some(object) => {
                object.tags = tags.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(key)),
        }
    }

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        self.record(StoreOp::Download(key.to_string()));
        let bytes = self
            .object(key)
            .map(|o| o.bytes)
            .ok_or_else(|| StorageError::not_found(key))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

enum Scripted {
    Found(VideoMetadata),
    Empty,
    Error,
}

/// [`MetadataFetcher`] answering from a per-id script.
///
/// Unscripted ids get the tool's "video unavailable" failure.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    panics: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: &str, metadata: VideoMetadata) {
        self.script(id, Scripted::Found(metadata));
    }

    /// Successful exit with an empty document.
    pub fn add_empty(&self, id: &str) {
        self.script(id, Scripted::Empty);
    }

    /// The tool cannot be run for this id.
    pub fn fail_with_error(&self, id: &str) {
        self.script(id, Scripted::Error);
    }

    pub fn panic_on(&self, id: &str) {
        self.panics.lock().unwrap().insert(id.to_string());
    }

    pub fn fetched_ids(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn script(&self, id: &str, response: Scripted) {
        self.responses.lock().unwrap().insert(id.to_string(), response);
    }
}

#[async_trait]
impl MetadataFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _options: &FetchOptions) -> MediaResult<FetchOutcome> {
        let id = url.strip_prefix(WATCH_PREFIX).unwrap_or(url).to_string();
        self.calls.lock().unwrap().push(id.clone());

        let should_panic = self.panics.lock().unwrap().contains(&id);
        if should_panic {
            panic!("scripted panic for {}", id);
        }

        match self.responses.lock().unwrap().get(&id) {
            Some(Scripted::Found(metadata)) => Ok(FetchOutcome {
                success: true,
                errors: Vec::new(),
                metadata: Some(metadata.clone()),
            }),
            Some(Scripted::Empty) => Ok(FetchOutcome {
                success: true,
                errors: Vec::new(),
                metadata: Some(VideoMetadata::default()),
            }),
            Some(Scripted::Error) => Err(MediaError::fetch_failed("scripted error")),
            None => Ok(FetchOutcome {
                success: false,
                errors: vec!["ERROR: Video unavailable".to_string()],
                metadata: None,
            }),
        }
    }
}

/// [`Remuxer`] that copies its input and appends a marker.
#[derive(Default)]
pub struct FakeRemuxer {
    requests: Mutex<Vec<RemuxRequest>>,
    conversions: Mutex<Vec<(PathBuf, PathBuf)>>,
    failing: Mutex<Vec<String>>,
}

impl FakeRemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every remux whose input path contains `fragment`.
    pub fn fail_for(&self, fragment: &str) {
        self.failing.lock().unwrap().push(fragment.to_string());
    }

    pub fn requests(&self) -> Vec<RemuxRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn conversions(&self) -> Vec<(PathBuf, PathBuf)> {
        self.conversions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Remuxer for FakeRemuxer {
    async fn remux(&self, request: &RemuxRequest) -> MediaResult<()> {
        self.requests.lock().unwrap().push(request.clone());

        let input = request.input.to_string_lossy().to_string();
        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| input.contains(fragment.as_str()));
        if fails {
            return Err(MediaError::ffmpeg_failed(
                "scripted failure",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }

        let mut bytes = tokio::fs::read(&request.input).await?;
        bytes.extend_from_slice(b"+remuxed");
        tokio::fs::write(&request.output, bytes).await?;
        Ok(())
    }

    async fn convert_image(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.conversions
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf()));
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// [`MediaDownloader`] that drops scripted files into the work directory.
pub struct FakeDownloader {
    work_dir: PathBuf,
    passes: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<DownloadRequest>>,
}

impl FakeDownloader {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            passes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Files (relative to the work directory) produced by the next pass.
    pub fn queue_pass(&self, files: &[&str]) {
        self.passes
            .lock()
            .unwrap()
            .push_back(files.iter().map(|f| f.to_string()).collect());
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download_pass(&self, request: &DownloadRequest) -> MediaResult<ProcessOutput> {
        self.requests.lock().unwrap().push(request.clone());

        let files = self.passes.lock().unwrap().pop_front().unwrap_or_default();
        for file in files {
            let path = self.work_dir.join(file);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, b"video").await?;
        }

        Ok(ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}
