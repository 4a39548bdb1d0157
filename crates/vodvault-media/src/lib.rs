#![deny(unreachable_patterns)]
//! yt-dlp and FFmpeg CLI wrappers.
//!
//! This crate provides:
//! - A narrow `ProcessRunner` interface for every external tool invocation
//! - Type-safe FFmpeg command building for stream-copy remuxes
//! - Metadata fetch and download passes through yt-dlp
//! - Normalization of the metadata JSON yt-dlp prints
//! - Cookies file validation and cross-device file moves

pub mod command;
pub mod cookies;
pub mod error;
pub mod fs_utils;
pub mod normalize;
pub mod remux;
pub mod ytdlp;

pub use command::{FfmpegCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use cookies::prepare_cookies_file;
pub use error::{MediaError, MediaResult};
pub use fs_utils::{is_name_too_long_error, move_file};
pub use normalize::{normalize_metadata_json, parse_metadata};
pub use remux::{Attachment, FfmpegRemuxer, RemuxRequest, Remuxer};
pub use ytdlp::{
    DownloadRequest, FetchOptions, FetchOutcome, MediaDownloader, MetadataFetcher, YtDlp,
};
