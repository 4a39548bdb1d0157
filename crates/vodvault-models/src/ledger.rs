//! Ledger record wire format.
//!
//! The ledger is newline-delimited text, one `youtube <id>` record per line,
//! compatible with yt-dlp's `--download-archive` file.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::video::VideoId;

/// Extractor key written in front of every id.
pub const LEDGER_SOURCE: &str = "youtube";

/// Errors parsing a ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerRecordError {
    #[error("empty ledger line")]
    Empty,

    #[error("malformed ledger line: {0}")]
    Malformed(String),
}

/// A single ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerRecord {
    pub id: VideoId,
}

impl LedgerRecord {
    pub fn new(id: VideoId) -> Self {
        Self { id }
    }

    /// The record as a complete line, newline included.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for LedgerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", LEDGER_SOURCE, self.id)
    }
}

impl FromStr for LedgerRecord {
    type Err = LedgerRecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(LedgerRecordError::Empty);
        }

        match line.split_once(' ') {
            Some((source, id)) if source == LEDGER_SOURCE && !id.trim().is_empty() => {
                Ok(Self::new(VideoId::from(id.trim())))
            }
            _ => Err(LedgerRecordError::Malformed(line.to_string())),
        }
    }
}
