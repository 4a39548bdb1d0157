//! Run orchestration and the per-item state machine.
//!
//! A run pulls the ledger, processes payloads left over from an earlier run,
//! then alternates download passes with processing passes. Each discovered
//! item is driven through its states by one task:
//!
//! ```text
//! Discovered ─(final form)──────────────────────────────┐
//!     └─> Resolving ─> Planning ─> Enriching ─> ReadyToUpload ─> Uploading ─> Completed | Failed
//! ```
//!
//! A failure in the resolve/plan segment cancels enrichment for that item
//! only; upload and ledger append always run with the path at hand.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use chrono::{Days, Utc};
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use vodvault_media::DownloadRequest;
use vodvault_models::{FileForm, ItemState, MediaItem, PipelineResult, RunSummary, StageOutcome};
use vodvault_storage::ObjectTags;

use crate::context::PipelineContext;
use crate::enricher::Enricher;
use crate::error::WorkerResult;
use crate::logging::ItemLogger;
use crate::metrics;
use crate::planner::PathPlanner;
use crate::resolver::IdResolver;
use crate::scanner::{Scanner, SessionClaims};
use crate::uploader::{Uploader, VIDEO_CONTENT_TYPE};

/// State that follows `state` given the outcome of its step.
///
/// `cancelled` is the item's cancellation signal; it only gates `Enriching`.
pub fn next_state(
    state: ItemState,
    form: FileForm,
    outcome: Option<&StageOutcome>,
    cancelled: bool,
) -> ItemState {
    match state {
        ItemState::Discovered => match form {
            FileForm::Final => ItemState::ReadyToUpload,
            FileForm::Raw => ItemState::Resolving,
        },
        ItemState::Resolving => ItemState::Planning,
        ItemState::Planning => match outcome {
            Some(StageOutcome::Planned(_)) if !cancelled => ItemState::Enriching,
            _ => ItemState::ReadyToUpload,
        },
        ItemState::Enriching => ItemState::ReadyToUpload,
        ItemState::ReadyToUpload => ItemState::Uploading,
        ItemState::Uploading => match outcome {
            Some(StageOutcome::Uploaded(_)) => ItemState::Completed,
            _ => ItemState::Failed,
        },
        ItemState::Completed => ItemState::Completed,
        ItemState::Failed => ItemState::Failed,
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    ctx: PipelineContext,
    scanner: Scanner,
    resolver: IdResolver,
    planner: PathPlanner,
    enricher: Enricher,
    uploader: Uploader,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext) -> WorkerResult<Self> {
        let config = ctx.config.clone();
        Ok(Self {
            scanner: Scanner::new(&config.work_dir, &config.extension)?,
            resolver: IdResolver::new(ctx.fetcher.clone(), ctx.fetch_options()),
            planner: PathPlanner::new(config.title_max_length, config.path_max_length),
            enricher: Enricher::new(ctx.remuxer.clone()),
            uploader: ctx.uploader(),
            ctx,
        })
    }

    /// Execute one full run.
    ///
    /// Only a ledger that cannot be pulled fails the run; item failures are
    /// reported in the summary.
    pub async fn run(&self) -> WorkerResult<RunSummary> {
        let run_id = Uuid::new_v4();
        self.execute()
            .instrument(info_span!("run", run_id = %run_id))
            .await
    }

    async fn execute(&self) -> WorkerResult<RunSummary> {
        info!("Starting run over {} source(s)", self.ctx.config.sources.len());
        self.ctx.ledger.pull().await?;

        let mut claims = SessionClaims::new();
        let mut summary = RunSummary::default();

        // Payloads left behind by an interrupted run.
        summary.extend(self.process_pass(&mut claims).await?);

        let passes = self.ctx.config.max_download_passes;
        for pass in 1..=passes {
            self.download_pass(pass, passes).await;
            summary.extend(self.process_pass(&mut claims).await?);
        }

        info!(
            "Run finished: {} completed, {} failed",
            summary.completed(),
            summary.failed()
        );
        for result in summary.results.iter().filter(|r| !r.is_completed()) {
            error!(
                item_id = %result.id,
                "Item failed: {}",
                result.error.as_deref().unwrap_or("unknown cause")
            );
        }

        Ok(summary)
    }

    /// Download request for one pass over the configured sources.
    pub fn download_request(&self) -> DownloadRequest {
        let config = &self.ctx.config;
        let today = Utc::now().date_naive();

        DownloadRequest {
            sources: config.sources.clone(),
            format: config.format.clone(),
            output_template: config.output_template(),
            archive_path: self.ctx.ledger.working_copy_path(),
            max_downloads: config.max_downloads_per_pass,
            date_before: today.checked_sub_days(Days::new(2)).unwrap_or(today),
            cookies: self.ctx.cookies.clone(),
            external_downloader: config.external_downloader.clone(),
            external_downloader_args: config.external_downloader_args.clone(),
        }
    }

    async fn download_pass(&self, pass: u32, passes: u32) {
        info!("Download pass {}/{}", pass, passes);

        match self.ctx.downloader.download_pass(&self.download_request()).await {
            Ok(output) if output.success() => info!("Download pass {} finished", pass),
            Ok(output) => warn!(
                "Download pass {} exited with {:?}: {}",
                pass,
                output.exit_code,
                output.last_error_line().unwrap_or("no error output")
            ),
            Err(e) => warn!("Download pass {} failed: {}", pass, e),
        }
    }

    /// Scan for new items and drive each to a terminal state.
    async fn process_pass(&self, claims: &mut SessionClaims) -> WorkerResult<Vec<PipelineResult>> {
        let items = self.scanner.scan(claims, &self.ctx.ledger).await;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = items.iter().map(|item| item.id.clone()).collect();
        self.ctx.ledger.mark_in_progress(&ids).await?;

        let mut results = Vec::with_capacity(items.len());

        if self.ctx.config.sequential {
            for item in items {
                results.push(self.run_item(item).await);
            }
            return Ok(results);
        }

        let mut chains = JoinSet::new();
        for item in items {
            let this = self.clone();
            chains.spawn(async move { this.run_item(item).await }.in_current_span());
        }
        while let Some(joined) = chains.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Item task did not finish: {}", e),
            }
        }

        Ok(results)
    }

    /// Drive one item; a panic anywhere in its chain becomes a failed result.
    async fn run_item(&self, item: MediaItem) -> PipelineResult {
        let logger = ItemLogger::new(&item.id, item.state);
        let span = logger.create_span();
        let id = item.id.clone();
        let path = item.path.clone();

        let result = AssertUnwindSafe(self.drive(item, logger))
            .catch_unwind()
            .instrument(span)
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(item_id = %id, "Item chain panicked: {}", message);
                PipelineResult::failed(id, Some(path), format!("panicked: {}", message))
            });

        metrics::record_item(result.outcome);
        result
    }

    async fn drive(&self, mut item: MediaItem, mut logger: ItemLogger) -> PipelineResult {
        logger.log_start(&item.path.display().to_string());

        let mut cancelled = false;
        let mut failure: Option<String> = None;

        while !item.state.is_terminal() {
            let outcome = self.step(&item).await;

            if let Some(StageOutcome::Failed(cause)) = &outcome {
                if item.state == ItemState::Uploading {
                    failure = Some(cause.clone());
                } else {
                    logger.log_warning(&format!("{}, skipping enrichment", cause));
                    cancelled = true;
                }
            }
            if let Some(outcome) = &outcome {
                logger = self.apply(&mut item, outcome, logger);
            }

            let next = next_state(item.state, item.form, outcome.as_ref(), cancelled);
            item.advance(next);
            logger = logger.at(next);
        }

        match item.state {
            ItemState::Completed => {
                logger.log_completion(&item.path.display().to_string());
                PipelineResult::completed(item.id, item.path)
            }
            _ => {
                let cause = failure.unwrap_or_else(|| "upload failed".to_string());
                logger.log_error(&cause);
                PipelineResult::failed(item.id, Some(item.path), cause)
            }
        }
    }

    /// Run the work attached to the item's current state.
    async fn step(&self, item: &MediaItem) -> Option<StageOutcome> {
        match item.state {
            ItemState::Resolving => Some(StageOutcome::Resolved(
                self.resolver.resolve(&item.id).await,
            )),
            ItemState::Planning => Some(match self.planner.plan(item).await {
                Ok(path) => StageOutcome::Planned(path),
                Err(e) => StageOutcome::Failed(e.to_string()),
            }),
            ItemState::Enriching => Some(StageOutcome::Enriched(self.enricher.enrich(item).await)),
            ItemState::Uploading => Some(match self.upload_and_record(item).await {
                Ok(path) => StageOutcome::Uploaded(path),
                Err(e) => StageOutcome::Failed(e.to_string()),
            }),
            ItemState::Discovered
            | ItemState::ReadyToUpload
            | ItemState::Completed
            | ItemState::Failed => None,
        }
    }

    fn apply(&self, item: &mut MediaItem, outcome: &StageOutcome, logger: ItemLogger) -> ItemLogger {
        match outcome {
            StageOutcome::Resolved(resolution) => {
                let logger = if resolution.id != item.id {
                    logger.with_id(&resolution.id)
                } else {
                    logger
                };
                item.id = resolution.id.clone();
                item.metadata = resolution.metadata.clone();
                logger
            }
            StageOutcome::Planned(path) | StageOutcome::Enriched(path) => {
                item.path = path.clone();
                logger
            }
            StageOutcome::Uploaded(_) | StageOutcome::Failed(_) => logger,
        }
    }

    async fn upload_and_record(&self, item: &MediaItem) -> WorkerResult<PathBuf> {
        let mut tags = ObjectTags::new();
        tags.insert("id".to_string(), item.id.to_string());
        if let Some(duration) = item.duration() {
            tags.insert("duration".to_string(), duration.to_string());
        }

        self.uploader
            .upload(&item.path, VIDEO_CONTENT_TYPE, &tags)
            .await?;
        self.ctx.ledger.append(&item.id).await?;
        Ok(item.path.clone())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
