//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, WorkerResult};

/// Format selector used when `FORMAT` is unset.
pub const DEFAULT_FORMAT: &str = "bestvideo+bestaudio/best";

/// Cookies file picked up from the current directory when `COOKIES_PATH` is unset.
const DEFAULT_COOKIES_FILE: &str = "cookies.txt";

/// Dedicated directory created under `WORK_DIR` (or the system temp dir).
///
/// Only this directory is removed at shutdown, never `WORK_DIR` itself.
pub const WORK_SUBDIR: &str = "backup-dl";

/// Ledger file names inside the work directory.
pub const LEDGER_FILE: &str = "archive.txt";
pub const WORKING_LEDGER_FILE: &str = "archive_ytdl.txt";
pub const SNAPSHOT_LEDGER_FILE: &str = "archive_old.txt";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Channel / playlist URLs handed to every download pass
    pub sources: Vec<String>,
    /// yt-dlp format selector
    pub format: String,
    /// Number of download passes per run
    pub max_download_passes: u32,
    /// `--max-downloads` for each pass (one per pass when an item cap is set)
    pub max_downloads_per_pass: Option<u32>,
    /// Cookies file to copy into the work directory
    pub cookies_path: Option<PathBuf>,
    /// Work directory; every object key is relative to it
    pub work_dir: PathBuf,
    /// yt-dlp binary
    pub ytdlp_path: PathBuf,
    /// FFmpeg binary
    pub ffmpeg_path: PathBuf,
    /// External downloader for yt-dlp (e.g. `aria2c`)
    pub external_downloader: Option<String>,
    /// Arguments for the external downloader
    pub external_downloader_args: Option<String>,
    /// Await each item chain before starting the next
    pub sequential: bool,
    /// Container extension of downloaded payloads, without the dot
    pub extension: String,
    /// Title truncation budget in characters
    pub title_max_length: usize,
    /// Path length ceiling in characters
    pub path_max_length: usize,
    /// Poll interval while waiting for an archived object to disappear
    pub archive_poll_interval: Duration,
    /// Poll window before the delete is re-issued
    pub archive_poll_timeout: Duration,
    /// Delay before the single upload retry
    pub upload_retry_delay: Duration,
    /// Timeout for every external process
    pub process_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            format: DEFAULT_FORMAT.to_string(),
            max_download_passes: 1,
            max_downloads_per_pass: None,
            cookies_path: None,
            work_dir: std::env::temp_dir().join(WORK_SUBDIR),
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            external_downloader: None,
            external_downloader_args: None,
            sequential: false,
            extension: "mkv".to_string(),
            title_max_length: 80,
            path_max_length: 260,
            archive_poll_interval: Duration::from_secs(10),
            archive_poll_timeout: Duration::from_secs(60),
            upload_retry_delay: Duration::from_secs(1),
            process_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let raw_sources = lookup("CHANNELS_IN_ARRAY")
            .ok_or_else(|| PipelineError::config("CHANNELS_IN_ARRAY not set"))?;
        let sources: Vec<String> = serde_json::from_str(&raw_sources)
            .map_err(|e| PipelineError::config(format!("CHANNELS_IN_ARRAY is not a JSON array of strings: {}", e)))?;

        let parse = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // An item cap downloads one video per pass, N passes; no cap is one unbounded pass.
        let item_cap: Option<u32> = parse("MAX_DOWNLOAD").and_then(|v| v.trim().parse().ok());
        let (max_download_passes, max_downloads_per_pass) = match item_cap {
            Some(cap) => (cap, Some(1)),
            None => (1, None),
        };

        let cookies_path = parse("COOKIES_PATH").map(PathBuf::from).or_else(|| {
            let default = PathBuf::from(DEFAULT_COOKIES_FILE);
            default.exists().then_some(default)
        });

        Ok(Self {
            sources,
            format: parse("FORMAT").unwrap_or(defaults.format),
            max_download_passes,
            max_downloads_per_pass,
            cookies_path,
            work_dir: parse("WORK_DIR")
                .map(|dir| PathBuf::from(dir).join(WORK_SUBDIR))
                .unwrap_or(defaults.work_dir),
            ytdlp_path: parse("YTDLP_PATH").map(PathBuf::from).unwrap_or(defaults.ytdlp_path),
            ffmpeg_path: parse("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.ffmpeg_path),
            external_downloader: parse("EXTERNAL_DOWNLOADER"),
            external_downloader_args: parse("EXTERNAL_DOWNLOADER_ARGS"),
            sequential: lookup("SYNCHRONOUS").is_some(),
            extension: defaults.extension,
            title_max_length: parse_or(&lookup, "TITLE_MAX_LENGTH", defaults.title_max_length),
            path_max_length: parse_or(&lookup, "PATH_MAX_LENGTH", defaults.path_max_length),
            archive_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "ARCHIVE_POLL_INTERVAL_SECS",
                defaults.archive_poll_interval.as_secs(),
            )),
            archive_poll_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ARCHIVE_POLL_TIMEOUT_SECS",
                defaults.archive_poll_timeout.as_secs(),
            )),
            upload_retry_delay: Duration::from_secs(parse_or(
                &lookup,
                "UPLOAD_RETRY_DELAY_SECS",
                defaults.upload_retry_delay.as_secs(),
            )),
            process_timeout: parse("PROCESS_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs),
        })
    }

    /// yt-dlp output template: `<work>/<channel id>/<video id>.<ext>`.
    pub fn output_template(&self) -> String {
        join_template(&self.work_dir, "%(channel_id)s/%(id)s.%(ext)s")
    }
}

fn join_template(dir: &Path, template: &str) -> String {
    dir.join(template).to_string_lossy().to_string()
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
