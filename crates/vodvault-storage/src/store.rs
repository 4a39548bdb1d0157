//! Object storage interface.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Tags / metadata attached to an uploaded object.
pub type ObjectTags = BTreeMap<String, String>;

/// Storage tier of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tier {
    /// Frequently accessed, overwritable in place
    #[default]
    Hot,
    /// Infrequently accessed, overwritable in place
    Cool,
    /// Archival; an existing object must be deleted before it can be replaced
    Archive,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Cool => "cool",
            Tier::Archive => "archive",
        }
    }

    /// Whether objects in this tier forbid in-place overwrite.
    pub fn is_archival(&self) -> bool {
        matches!(self, Tier::Archive)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tiered object storage.
///
/// Keys are POSIX-style relative paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Tier of an existing object.
    async fn get_tier(&self, key: &str) -> StorageResult<Tier>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Upload a local file.
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        tier: Tier,
        metadata: &ObjectTags,
    ) -> StorageResult<()>;

    /// Replace the tag set of an object.
    async fn set_tags(&self, key: &str, tags: &ObjectTags) -> StorageResult<()>;

    /// Download an object to a local file, creating parent directories.
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_properties() {
        assert!(Tier::Archive.is_archival());
        assert!(!Tier::Cool.is_archival());
        assert_eq!(Tier::default(), Tier::Hot);
        assert_eq!(Tier::Archive.to_string(), "archive");
    }
}
