//! Run-wide context shared by every stage.

use std::path::PathBuf;
use std::sync::Arc;

use vodvault_media::{FetchOptions, MediaDownloader, MetadataFetcher, Remuxer};
use vodvault_storage::ObjectStore;

use crate::config::PipelineConfig;
use crate::ledger::Ledger;
use crate::uploader::Uploader;

/// Configuration plus the external collaborators, built once per run.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub fetcher: Arc<dyn MetadataFetcher>,
    pub remuxer: Arc<dyn Remuxer>,
    pub downloader: Arc<dyn MediaDownloader>,
    pub store: Arc<dyn ObjectStore>,
    pub ledger: Arc<Ledger>,
    /// Writable copy of the cookies file, when one was usable
    pub cookies: Option<PathBuf>,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn MetadataFetcher>,
        remuxer: Arc<dyn Remuxer>,
        downloader: Arc<dyn MediaDownloader>,
        store: Arc<dyn ObjectStore>,
        cookies: Option<PathBuf>,
    ) -> Self {
        let config = Arc::new(config);
        let ledger = Arc::new(Ledger::new(
            store.clone(),
            Uploader::new(store.clone(), config.clone()),
            config.work_dir.clone(),
        ));

        Self {
            config,
            fetcher,
            remuxer,
            downloader,
            store,
            ledger,
            cookies,
        }
    }

    pub fn uploader(&self) -> Uploader {
        Uploader::new(self.store.clone(), self.config.clone())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            cookies: self.cookies.clone(),
        }
    }
}
