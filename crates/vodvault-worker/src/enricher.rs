//! Best-effort metadata and cover-art embedding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use vodvault_media::{move_file, Attachment, RemuxRequest, Remuxer};
use vodvault_models::{MediaItem, VideoMetadata};

use crate::error::{PipelineError, WorkerResult};

/// Thumbnail formats converted to JPEG before embedding, in lookup order.
pub const THUMBNAIL_EXTENSIONS: [&str; 5] = ["jpeg", "gif", "png", "bmp", "webp"];

/// Embedded `date` tag when the upload date is unknown.
const FALLBACK_EMBED_DATE: &str = "1970-01-01 00:00:00Z";

#[derive(Clone)]
pub struct Enricher {
    remuxer: Arc<dyn Remuxer>,
}

impl Enricher {
    pub fn new(remuxer: Arc<dyn Remuxer>) -> Self {
        Self { remuxer }
    }

    /// Embed metadata and cover art into the item's payload in place.
    ///
    /// Never fails: each step replaces the payload only on success, and a
    /// failed step is logged and skipped.
    pub async fn enrich(&self, item: &MediaItem) -> PathBuf {
        if let Some(metadata) = &item.metadata {
            if let Err(e) = self.embed_metadata(&item.path, metadata).await {
                warn!(item_id = %item.id, "Metadata embedding skipped: {}", e);
            }
        }

        // yt-dlp writes the thumbnail next to the raw download, under the raw name.
        if let Err(e) = self.embed_thumbnail(&item.original_path, &item.path).await {
            warn!(item_id = %item.id, "Thumbnail embedding skipped: {}", e);
        }

        item.path.clone()
    }

    async fn embed_metadata(&self, path: &Path, metadata: &VideoMetadata) -> WorkerResult<()> {
        let date = metadata
            .upload_date
            .map(|d| d.format("%Y-%m-%d 00:00:00Z").to_string())
            .unwrap_or_else(|| FALLBACK_EMBED_DATE.to_string());
        let description = metadata.description.clone().unwrap_or_default();

        let tags = [
            ("title", metadata.title.clone().unwrap_or_default()),
            ("artist", metadata.uploader.clone().unwrap_or_default()),
            ("date", date),
            ("description", description.clone()),
            ("comment", description),
        ];

        debug!("Embedding metadata into {}", path.display());
        self.replace_with(path, |output| {
            tags.iter()
                .fold(RemuxRequest::new(path, output), |request, (key, value)| {
                    request.with_metadata(*key, value.clone())
                })
        })
        .await
    }

    async fn embed_thumbnail(&self, raw_path: &Path, path: &Path) -> WorkerResult<()> {
        let Some(jpg) = self.prepare_thumbnail(raw_path).await? else {
            debug!("No thumbnail found for {}", raw_path.display());
            return Ok(());
        };

        debug!("Embedding {} into {}", jpg.display(), path.display());
        self.replace_with(path, |output| {
            RemuxRequest::new(path, output).with_attachment(Attachment::cover_jpeg(&jpg))
        })
        .await
    }

    /// `<base>.jpg` next to `raw_path`, converting the first other format found.
    async fn prepare_thumbnail(&self, raw_path: &Path) -> WorkerResult<Option<PathBuf>> {
        let jpg = sibling_with_extension(raw_path, "jpg");
        if path_exists(&jpg).await {
            return Ok(Some(jpg));
        }

        for ext in THUMBNAIL_EXTENSIONS {
            let source = sibling_with_extension(raw_path, ext);
            if path_exists(&source).await {
                debug!("Converting thumbnail {} => {}", source.display(), jpg.display());
                self.remuxer
                    .convert_image(&source, &jpg)
                    .await
                    .map_err(|e| PipelineError::enrich(e.to_string()))?;
                return Ok(Some(jpg));
            }
        }

        Ok(None)
    }

    /// Remux `target` into a hidden temporary file beside it, then swap it in.
    async fn replace_with<F>(&self, target: &Path, build: F) -> WorkerResult<()>
    where
        F: FnOnce(&Path) -> RemuxRequest,
    {
        let dir = target
            .parent()
            .ok_or_else(|| PipelineError::enrich(format!("{} has no parent", target.display())))?;

        let temp = tempfile::Builder::new()
            .prefix(".enrich-")
            .suffix(".mkv")
            .tempfile_in(dir)?
            .into_temp_path();

        self.remuxer
            .remux(&build(&temp))
            .await
            .map_err(|e| PipelineError::enrich(e.to_string()))?;

        move_file(&temp, target).await?;
        Ok(())
    }
}

fn sibling_with_extension(path: &Path, ext: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!("{}.{}", stem, ext))
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
