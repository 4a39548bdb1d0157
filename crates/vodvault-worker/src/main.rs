//! Pipeline worker binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vodvault_media::{prepare_cookies_file, FfmpegRemuxer, ProcessRunner, TokioProcessRunner, YtDlp};
use vodvault_models::RunSummary;
use vodvault_storage::S3Client;
use vodvault_worker::config::WORK_SUBDIR;
use vodvault_worker::{Orchestrator, PipelineConfig, PipelineContext};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env();
    let env_filter = match "vodvault=info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vodvault-worker");

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Pipeline config: {:?}", config);
    let work_dir = config.work_dir.clone();

    let outcome = tokio::select! {
        result = run(config) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, abandoning in-flight items");
            None
        }
    };

    // Completed items are already stored remotely; everything else is redone next run.
    if removes_work_dir(outcome.as_ref(), &work_dir) {
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!("Could not remove work directory {}: {}", work_dir.display(), e);
        }
    } else {
        info!("Keeping work directory {}", work_dir.display());
    }

    match outcome {
        Some(Ok(summary)) => {
            info!(
                "Worker finished: {} completed, {} failed",
                summary.completed(),
                summary.failed()
            );
        }
        Some(Err(e)) => {
            error!("Run failed: {:#}", e);
            std::process::exit(1);
        }
        None => std::process::exit(130),
    }
}

/// Only the dedicated work directory is ever removed, and only after a run
/// that finished or was interrupted. A failed run keeps its leftovers for
/// the next run to resume.
fn removes_work_dir(outcome: Option<&anyhow::Result<RunSummary>>, work_dir: &Path) -> bool {
    let dedicated = work_dir
        .file_name()
        .map_or(false, |name| name == WORK_SUBDIR);
    dedicated && !matches!(outcome, Some(Err(_)))
}

async fn run(config: PipelineConfig) -> anyhow::Result<RunSummary> {
    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("Failed to create work directory {}", config.work_dir.display()))?;

    let mut runner = TokioProcessRunner::new();
    if let Some(timeout) = config.process_timeout {
        runner = runner.with_timeout(timeout.as_secs());
    }
    let runner: Arc<dyn ProcessRunner> = Arc::new(runner);

    let ytdlp = Arc::new(YtDlp::new(&config.ytdlp_path, runner.clone()));
    let remuxer = Arc::new(FfmpegRemuxer::new(&config.ffmpeg_path, runner));

    let store = S3Client::from_env()
        .await
        .context("Failed to create storage client")?;

    let cookies = match &config.cookies_path {
        Some(path) => prepare_cookies_file(path, &config.work_dir).await,
        None => None,
    };
    if config.cookies_path.is_some() && cookies.is_none() {
        warn!("Cookies file unusable, continuing without cookies");
    }

    let ctx = PipelineContext::new(
        config,
        ytdlp.clone(),
        remuxer,
        ytdlp,
        Arc::new(store),
        cookies,
    );

    let summary = Orchestrator::new(ctx)?.run().await?;
    Ok(summary)
}
