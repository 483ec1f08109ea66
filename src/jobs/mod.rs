//! Background job scheduling and workers

pub mod lease_sweeper;
pub mod transcode_worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::media::encoder::VideoEncoder;
use crate::media::layout::MediaLayout;
use crate::services::{IngestService, TranscodeQueue};
use self::transcode_worker::TranscodeWorker;

/// Initialize and start the periodic job scheduler
pub async fn start_scheduler(
    ingest_service: Arc<IngestService>,
    queue: Arc<TranscodeQueue>,
    config: &Config,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Incoming drop-folder scan
    let ingest = ingest_service.clone();
    let scan_job = Job::new_async(
        format!("*/{} * * * * *", config.ingest_scan_secs).as_str(),
        move |_uuid, _l| {
            let ingest = ingest.clone();
            Box::pin(async move {
                match ingest.scan_incoming().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Ingest scan queued new videos"),
                    Err(e) => tracing::error!("Ingest scan error: {}", e),
                }
            })
        },
    )?;
    scheduler.add(scan_job).await?;

    // Reclaim jobs whose worker lease expired
    let sweep_queue = queue.clone();
    let sweep_job = Job::new_async(
        format!("*/{} * * * * *", config.lease_sweep_secs).as_str(),
        move |_uuid, _l| {
            let queue = sweep_queue.clone();
            Box::pin(async move {
                if let Err(e) = lease_sweeper::sweep(queue).await {
                    tracing::error!("Lease sweeper error: {}", e);
                }
            })
        },
    )?;
    scheduler.add(sweep_job).await?;

    scheduler.start().await?;

    info!("Job scheduler started");
    Ok(scheduler)
}

/// Spawn the transcode worker pool.
pub fn start_workers(
    db: Database,
    queue: Arc<TranscodeQueue>,
    encoder: Arc<dyn VideoEncoder>,
    layout: MediaLayout,
    config: &Config,
    worker_count: usize,
) -> Vec<JoinHandle<()>> {
    (1..=worker_count)
        .map(|i| {
            let worker = TranscodeWorker::new(
                format!("worker-{i}"),
                db.clone(),
                queue.clone(),
                encoder.clone(),
                layout.clone(),
                Duration::from_secs(config.poll_interval_secs),
                config.hls_enabled,
            );
            tokio::spawn(async move { worker.run().await })
        })
        .collect()
}
