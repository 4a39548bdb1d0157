//! Metadata fetch and download passes using yt-dlp.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use vodvault_models::VideoMetadata;

use crate::command::{ProcessOutput, ProcessRunner};
use crate::error::{MediaError, MediaResult};
use crate::normalize::parse_metadata;

/// yt-dlp exit code when `--max-downloads` was reached.
const EXIT_MAX_DOWNLOADS_REACHED: i32 = 101;

/// Options for a metadata fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Netscape cookies file for authenticated requests
    pub cookies: Option<PathBuf>,
}

/// Result of a metadata fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Whether the tool exited successfully
    pub success: bool,
    /// Error lines reported by the tool
    pub errors: Vec<String>,
    /// Parsed metadata, when the tool printed any
    pub metadata: Option<VideoMetadata>,
}

impl FetchOutcome {
    /// Metadata from a successful, non-empty fetch.
    pub fn into_metadata(self) -> Option<VideoMetadata> {
        if !self.success {
            return None;
        }
        self.metadata.filter(|m| !m.is_empty())
    }
}

/// Metadata-fetch collaborator.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch metadata for a single video URL.
    ///
    /// Returns `Err` when the tool could not be run or its output could not
    /// be parsed; a tool-reported failure is an `Ok` outcome with
    /// `success == false`.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> MediaResult<FetchOutcome>;
}

/// One raw-download pass over the configured sources.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Channel / playlist / video URLs
    pub sources: Vec<String>,
    /// Format selector
    pub format: String,
    /// Output template, e.g. `<work>/%(channel_id)s/%(id)s.%(ext)s`
    pub output_template: String,
    /// Download archive (ids to skip)
    pub archive_path: PathBuf,
    /// Stop after this many downloads
    pub max_downloads: Option<u32>,
    /// Only videos uploaded on or before this date
    pub date_before: NaiveDate,
    /// Netscape cookies file
    pub cookies: Option<PathBuf>,
    /// External downloader (e.g. `aria2c`)
    pub external_downloader: Option<String>,
    /// Arguments for the external downloader
    pub external_downloader_args: Option<String>,
}

impl DownloadRequest {
    /// yt-dlp arguments for this pass.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--ignore-config".into(),
            "--format".into(),
            self.format.clone(),
            "--ignore-errors".into(),
            "--merge-output-format".into(),
            "mkv".into(),
            "--no-check-certificate".into(),
            "--output".into(),
            self.output_template.clone(),
            "--download-archive".into(),
            self.archive_path.to_string_lossy().to_string(),
            "--write-thumbnail".into(),
            "--no-color".into(),
            "--datebefore".into(),
            self.date_before.format("%Y%m%d").to_string(),
            "--prefer-free-formats".into(),
        ];

        if let Some(max) = self.max_downloads {
            args.push("--max-downloads".into());
            args.push(max.to_string());
        }

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().to_string());
        }

        if let Some(downloader) = &self.external_downloader {
            args.push("--downloader".into());
            args.push(downloader.clone());
            if let Some(downloader_args) = &self.external_downloader_args {
                args.push("--downloader-args".into());
                args.push(format!("{}:{}", downloader, downloader_args));
            }
        }

        args.extend(self.sources.iter().cloned());
        args
    }
}

/// Raw-download collaborator.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Run one download pass. Per-video failures are logged by the tool and
    /// do not fail the pass.
    async fn download_pass(&self, request: &DownloadRequest) -> MediaResult<ProcessOutput>;
}

/// yt-dlp driven through a [`ProcessRunner`].
#[derive(Clone)]
pub struct YtDlp {
    path: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl YtDlp {
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            path: path.into(),
            runner,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fetch_args(url: &str, options: &FetchOptions) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--ignore-config".into(),
            "--no-playlist".into(),
            "--flat-playlist".into(),
            "--no-warnings".into(),
            "--dump-single-json".into(),
        ];
        if let Some(cookies) = &options.cookies {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().to_string());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MetadataFetcher for YtDlp {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> MediaResult<FetchOutcome> {
        let output = self
            .runner
            .run(&self.path, &Self::fetch_args(url, options))
            .await?;

        let errors: Vec<String> = output
            .stderr
            .iter()
            .filter(|l| l.starts_with("ERROR"))
            .cloned()
            .collect();

        // The JSON document is the last stdout line that looks like one.
        let document = output
            .stdout
            .iter()
            .rev()
            .map(|l| l.trim())
            .find(|l| l.starts_with('{'));

        let metadata = match document {
            Some(doc) => Some(parse_metadata(doc)?),
            None if output.success() => {
                return Err(MediaError::fetch_failed(format!(
                    "no metadata document printed for {}",
                    url
                )))
            }
            None => None,
        };

        if !output.success() {
            debug!(
                url = %url,
                exit_code = ?output.exit_code,
                "yt-dlp metadata fetch failed: {}",
                output.last_error_line().unwrap_or("Unknown error")
            );
        }

        Ok(FetchOutcome {
            success: output.success(),
            errors,
            metadata,
        })
    }
}

#[async_trait]
impl MediaDownloader for YtDlp {
    async fn download_pass(&self, request: &DownloadRequest) -> MediaResult<ProcessOutput> {
        if request.sources.is_empty() {
            return Err(MediaError::download_failed("no sources configured"));
        }

        info!(
            sources = request.sources.len(),
            max_downloads = ?request.max_downloads,
            "Starting yt-dlp download pass"
        );

        let output = self.runner.run(&self.path, &request.build_args()).await?;

        match output.exit_code {
            Some(0) => info!("Download pass finished"),
            Some(EXIT_MAX_DOWNLOADS_REACHED) => info!("Download pass stopped at max downloads"),
            code => warn!(
                exit_code = ?code,
                "Download pass exited with errors: {}",
                output.last_error_line().unwrap_or("Unknown error")
            ),
        }

        Ok(output)
    }
}
