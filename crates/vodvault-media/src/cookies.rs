//! Cookies file handling for authenticated yt-dlp requests.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Minimum size for a valid cookies file (bytes).
/// A real Netscape cookies file is at least ~50 bytes.
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Name of the writable copy inside the work directory.
const WRITABLE_COOKIES_NAME: &str = "cookies.txt";

/// Validate that a cookies file appears to be in Netscape format.
///
/// Netscape cookies files either start with "# Netscape HTTP Cookie File"
/// or contain tab-separated lines with domain entries.
fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| line.split('\t').count() >= 6)
}

/// Copy a cookies file into `work_dir` so yt-dlp can write it back.
///
/// Returns `None` if:
/// - The file doesn't exist
/// - The file is empty or too small
/// - The file is not in valid Netscape format
/// - The copy fails
pub async fn prepare_cookies_file(source: &Path, work_dir: &Path) -> Option<PathBuf> {
    let metadata = match tokio::fs::metadata(source).await {
        Ok(metadata) => metadata,
        Err(_) => {
            debug!("Cookies file not found at {}, skipping", source.display());
            return None;
        }
    };

    if metadata.len() < MIN_COOKIES_FILE_SIZE {
        debug!(
            "Cookies file {} is too small ({} bytes), skipping",
            source.display(),
            metadata.len()
        );
        return None;
    }

    match tokio::fs::read_to_string(source).await {
        Ok(content) if is_valid_netscape_cookies(&content) => {}
        Ok(_) => {
            warn!(
                "Cookies file {} is not in valid Netscape format, skipping",
                source.display()
            );
            return None;
        }
        Err(e) => {
            warn!("Failed to read cookies file: {}", e);
            return None;
        }
    }

    let target = work_dir.join(WRITABLE_COOKIES_NAME);
    if let Err(e) = tokio::fs::create_dir_all(work_dir).await {
        warn!("Failed to create work directory for cookies: {}", e);
        return None;
    }
    if let Err(e) = tokio::fs::copy(source, &target).await {
        warn!("Failed to copy cookies file to work directory: {}", e);
        return None;
    }

    info!("Find cookies file, using it for authenticated requests");
    Some(target)
}
