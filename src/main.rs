//! Projectionist - background video transcoding pipeline
//!
//! Daemon entry point: watches the incoming drop directory, transcodes
//! uploads into the resolution ladder, and keeps video/variant state in
//! SQLite for the API layer to read.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use projectionist::cli::CliOptions;
use projectionist::config::Config;
use projectionist::db::Database;
use projectionist::jobs;
use projectionist::media::encoder::{FfmpegEncoder, VideoEncoder};
use projectionist::media::layout::MediaLayout;
use projectionist::services::{IngestService, TranscodeQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let options = CliOptions::from_args();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "projectionist=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Projectionist transcode pipeline");

    // Data directories must exist before anything touches them
    if let Some(parent) = Path::new(&config.database_path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::create_dir_all(&config.media_path).await?;
    tokio::fs::create_dir_all(&config.incoming_path).await?;

    let db = Database::connect(&config.database_path).await?;
    db.ensure_schema().await?;
    tracing::info!("Database connected");

    let layout = MediaLayout::new(&config.media_path);
    let queue = Arc::new(TranscodeQueue::new(
        db.clone(),
        config.lease_secs,
        config.max_attempts,
    ));

    // Admin operation: retry a failed video and exit
    if let Some(video_id) = options.retry_video {
        let job = queue.retry(video_id).await?;
        tracing::info!(video_id = %video_id, job_id = %job.id, "Retry enqueued");
        return Ok(());
    }

    // Pick up anything a previous unclean shutdown left claimed
    let reclaimed = queue.reclaim_expired().await?;
    if reclaimed > 0 {
        tracing::warn!(reclaimed, "Reclaimed jobs from previous run");
    }

    let encoder = FfmpegEncoder::new(&config.ffmpeg_path, &config.ffprobe_path);
    if !encoder.is_available().await {
        tracing::warn!(
            ffmpeg = %config.ffmpeg_path,
            "ffmpeg not found - jobs will be requeued until the encoder is available"
        );
    }
    let encoder: Arc<dyn VideoEncoder> = Arc::new(encoder);

    let ingest_service = Arc::new(IngestService::new(
        db.clone(),
        queue.clone(),
        layout.clone(),
        &config.incoming_path,
    ));

    let _scheduler = jobs::start_scheduler(ingest_service, queue.clone(), &config).await?;

    let worker_count = options.workers_override.unwrap_or(config.worker_count);
    let workers = jobs::start_workers(
        db.clone(),
        queue.clone(),
        encoder,
        layout,
        &config,
        worker_count,
    );
    tracing::info!(workers = worker_count, "Transcode workers started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for handle in &workers {
        handle.abort();
    }
    let _ = futures::future::join_all(workers).await;

    Ok(())
}
