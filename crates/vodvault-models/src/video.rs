//! Video ids and resolved video metadata.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use url::Url;

/// Base URL used to build canonical watch URLs.
const WATCH_BASE_URL: &str = "https://www.youtube.com/watch";

/// Identifier of a source video (the token yt-dlp uses as `%(id)s`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id with every underscore turned into a hyphen and vice versa.
    ///
    /// External downloaders rewrite these characters in output names, so a
    /// raw filename may carry the swapped form of the real id.
    pub fn swapped_separators(&self) -> Self {
        Self(
            self.0
                .chars()
                .map(|c| match c {
                    '_' => '-',
                    '-' => '_',
                    other => other,
                })
                .collect(),
        )
    }

    /// Id with a leading underscore.
    pub fn underscore_prefixed(&self) -> Self {
        Self(format!("_{}", self.0))
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Build the canonical watch URL for a video id.
pub fn watch_url(id: &VideoId) -> String {
    match Url::parse_with_params(WATCH_BASE_URL, &[("v", id.as_str())]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?v={}", WATCH_BASE_URL, id),
    }
}

/// Metadata reported by the metadata-fetch tool for a single video.
///
/// Only the fields the pipeline consumes are kept; everything else in the
/// tool's JSON document is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Id as reported by the tool
    #[serde(default)]
    pub id: Option<String>,

    /// Video title
    #[serde(default)]
    pub title: Option<String>,

    /// Channel / uploader display name
    #[serde(default)]
    pub uploader: Option<String>,

    /// Upload date (`YYYYMMDD` in the tool output)
    #[serde(default, deserialize_with = "deserialize_upload_date")]
    pub upload_date: Option<NaiveDate>,

    /// Description text
    #[serde(default)]
    pub description: Option<String>,

    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

impl VideoMetadata {
    /// Whether the document carries anything usable.
    ///
    /// The tool sometimes exits successfully with an empty or title-less
    /// document; those count as a failed fetch.
    pub fn is_empty(&self) -> bool {
        self.title.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

/// Accepts `YYYYMMDD` (tool output) and `YYYY-MM-DD` (our own serialization).
/// Anything else is treated as an unknown date rather than an error.
fn deserialize_upload_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim();
        NaiveDate::parse_from_str(s, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .ok()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapped_separators() {
        let id = VideoId::from("abc_123-x");
        assert_eq!(id.swapped_separators().as_str(), "abc-123_x");
        assert_eq!(id.underscore_prefixed().as_str(), "_abc_123-x");
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(
            watch_url(&VideoId::from("abc-123")),
            "https://www.youtube.com/watch?v=abc-123"
        );
    }

    #[test]
    fn test_metadata_from_tool_json() {
        let json = r#"{
            "id": "abc123",
            "title": "Some Title",
            "uploader": "Someone",
            "upload_date": "20230101",
            "description": "desc",
            "duration": 61.5,
            "formats": [{"format_id": "18"}]
        }"#;

        let meta: VideoMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Some Title"));
        assert_eq!(meta.upload_date, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(meta.duration, Some(61.5));
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_metadata_tolerates_bad_date_and_nulls() {
        let json = r#"{"title": "t", "upload_date": "soon", "uploader": null}"#;
        let meta: VideoMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.upload_date, None);
        assert_eq!(meta.uploader, None);
    }

    #[test]
    fn test_empty_metadata() {
        assert!(VideoMetadata::default().is_empty());
        let meta = VideoMetadata {
            title: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(meta.is_empty());
    }
}
