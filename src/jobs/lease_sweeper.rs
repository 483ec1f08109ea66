//! Lease expiry sweeper
//!
//! A worker that crashes mid-job never acks; its job sits in `processing`
//! with a lease that eventually expires. This job requeues those so
//! another worker can pick them up. Runs periodically and once at boot.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::services::queue::TranscodeQueue;

/// Requeue every job whose lease has expired.
pub async fn sweep(queue: Arc<TranscodeQueue>) -> Result<()> {
    let reclaimed = queue.reclaim_expired().await?;

    if reclaimed > 0 {
        info!(reclaimed, "Requeued jobs with expired leases");
    } else {
        debug!(job = "lease_sweeper", "No expired leases");
    }

    Ok(())
}
