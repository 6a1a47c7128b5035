//! Scheduled maintenance tasks using tokio-cron-scheduler.
//!
//! These run independently of the ingest loop:
//! - Volume-baseline recompute (every 10 minutes)
//! - Retention sweep over stored events (daily)
//!
//! Both delegate to the monitor; failures are logged and the schedule
//! carries on.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::monitoring::pipeline::CrisisMonitor;

/// Start all scheduled tasks.
pub async fn start_scheduler(monitor: Arc<CrisisMonitor>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Baseline recompute - every 10 minutes
    let baseline_monitor = monitor.clone();
    let baseline_job = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let monitor = baseline_monitor.clone();
        Box::pin(async move {
            if let Err(e) = monitor.recompute_baseline().await {
                tracing::error!("Baseline recompute failed: {}", e);
            }
        })
    })?;
    scheduler.add(baseline_job).await?;

    // Retention sweep - daily at 03:00 UTC
    let sweep_monitor = monitor.clone();
    let sweep_job = Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
        let monitor = sweep_monitor.clone();
        Box::pin(async move {
            if let Err(e) = monitor.run_retention_sweep().await {
                tracing::error!("Retention sweep failed: {}", e);
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    scheduler.start().await?;
    tracing::info!(
        "Scheduled tasks started (baseline recompute every 10 minutes, retention sweep daily)"
    );
    Ok(scheduler)
}
