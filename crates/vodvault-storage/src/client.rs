//! S3-compatible client implementation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, StorageClass, Tag, Tagging,
};
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectStore, ObjectTags, Tier};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint URL (S3-compatible providers); AWS when absent
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Tier reported for an object's storage class.
pub fn tier_for_storage_class(class: Option<&StorageClass>) -> Tier {
    match class {
        Some(StorageClass::Glacier) | Some(StorageClass::DeepArchive) => Tier::Archive,
        Some(StorageClass::StandardIa)
        | Some(StorageClass::OnezoneIa)
        | Some(StorageClass::IntelligentTiering)
        | Some(StorageClass::GlacierIr) => Tier::Cool,
        _ => Tier::Hot,
    }
}

/// Storage class used when uploading into a tier.
pub fn storage_class_for_tier(tier: Tier) -> StorageClass {
    match tier {
        Tier::Hot => StorageClass::Standard,
        Tier::Cool => StorageClass::StandardIa,
        Tier::Archive => StorageClass::DeepArchive,
    }
}

/// Files larger than this are sent as a multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 256 * 1024 * 1024;

/// Preferred size of one multipart part.
pub const MULTIPART_PART_SIZE: u64 = 64 * 1024 * 1024;

/// S3 limit on the number of parts in one upload.
const MAX_PARTS: u64 = 10_000;

/// `(offset, length)` of each part of a `len`-byte file.
///
/// Parts grow beyond `part_size` when the file would otherwise need more
/// than [`MAX_PARTS`] of them.
pub fn plan_parts(len: u64, part_size: u64) -> Vec<(u64, u64)> {
    let part_size = part_size.max(len.div_ceil(MAX_PARTS)).max(1);
    let mut parts = Vec::new();
    let mut offset = 0;
    while offset < len {
        let length = part_size.min(len - offset);
        parts.push((offset, length));
        offset += length;
    }
    parts
}

/// HEAD responses carry no error body, so a missing key shows up as a bare 404.
fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .map_or(false, |response| response.status().as_u16() == 404)
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vodvault",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3Config::from_env()?;
        Self::new(config).await
    }

    /// Upload `path` in parts; the upload is aborted if any part fails.
    async fn upload_multipart(
        &self,
        key: &str,
        path: &Path,
        len: u64,
        content_type: &str,
        tier: Tier,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .storage_class(storage_class_for_tier(tier))
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::upload_failed(format!("no upload id for {}", key)))?
            .to_string();

        let parts = match self.upload_parts(key, path, len, &upload_id).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        if let Err(e) = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            self.abort_multipart(key, &upload_id).await;
            return Err(StorageError::upload_failed(e.to_string()));
        }

        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        path: &Path,
        len: u64,
        upload_id: &str,
    ) -> StorageResult<Vec<CompletedPart>> {
        let plan = plan_parts(len, MULTIPART_PART_SIZE);
        let total = plan.len();
        let mut completed = Vec::with_capacity(total);

        for (index, (offset, length)) in plan.into_iter().enumerate() {
            let part_number = i32::try_from(index + 1)
                .map_err(|_| StorageError::upload_failed("too many parts"))?;

            let body = ByteStream::read_from()
                .path(path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|e| StorageError::upload_failed(e.to_string()))?;

            let part = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|e| StorageError::upload_failed(e.to_string()))?;

            debug!("Uploaded part {}/{} of {}", part_number, total, key);
            completed.push(
                CompletedPart::builder()
                    .set_e_tag(part.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        Ok(completed)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!("Could not abort multipart upload of {}: {}", key, e);
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::AwsSdk(e.to_string())),
        }
    }

    async fn get_tier(&self, key: &str) -> StorageResult<Tier> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::not_found(key)
                } else {
                    StorageError::AwsSdk(e.to_string())
                }
            })?;

        Ok(tier_for_storage_class(head.storage_class()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

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
        debug!("Uploading {} to {} ({})", path.display(), key, tier);

        let metadata: HashMap<String, String> = metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let len = tokio::fs::metadata(path).await?.len();
        if len > MULTIPART_THRESHOLD {
            self.upload_multipart(key, path, len, content_type, tier, metadata)
                .await?;
            info!("Uploaded {} to {} in parts", path.display(), key);
            return Ok(());
        }

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .storage_class(storage_class_for_tier(tier))
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    async fn set_tags(&self, key: &str, tags: &ObjectTags) -> StorageResult<()> {
        let tag_set = tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| StorageError::tagging_failed(e.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| StorageError::tagging_failed(e.to_string()))?;

        self.client
            .put_object_tagging()
            .bucket(&self.bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| StorageError::tagging_failed(e.to_string()))?;

        Ok(())
    }

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        debug!("Downloading {} to {}", key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) || e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::DownloadFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to write file: {}", e)))?;

        info!("Downloaded {} to {}", key, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_mapping() {
        assert_eq!(tier_for_storage_class(None), Tier::Hot);
        assert_eq!(
            tier_for_storage_class(Some(&StorageClass::Standard)),
            Tier::Hot
        );
        assert_eq!(
            tier_for_storage_class(Some(&StorageClass::DeepArchive)),
            Tier::Archive
        );
        assert_eq!(
            tier_for_storage_class(Some(&StorageClass::Glacier)),
            Tier::Archive
        );
        assert_eq!(
            tier_for_storage_class(Some(&StorageClass::StandardIa)),
            Tier::Cool
        );
    }

    #[test]
    fn test_plan_parts_covers_file() {
        let parts = plan_parts(10, 4);
        assert_eq!(parts, vec![(0, 4), (4, 4), (8, 2)]);
        assert!(plan_parts(0, 4).is_empty());
        assert_eq!(plan_parts(8, 4), vec![(0, 4), (4, 4)]);
    }

    #[test]
    fn test_plan_parts_respects_part_limit() {
        let len = MULTIPART_PART_SIZE * MAX_PARTS * 2 + 1;
        let parts = plan_parts(len, MULTIPART_PART_SIZE);
        assert!(parts.len() as u64 <= MAX_PARTS);
        assert_eq!(parts.iter().map(|(_, l)| l).sum::<u64>(), len);
        assert!(MULTIPART_THRESHOLD < 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_upload_storage_class_round_trips_tier() {
        for tier in [Tier::Hot, Tier::Cool, Tier::Archive] {
            let class = storage_class_for_tier(tier);
            assert_eq!(tier_for_storage_class(Some(&class)), tier);
        }
    }
}
