//! Conveyor scheduler: promotes due retries, schedules failed jobs, and
//! reaps expired leases on a fixed tick.

use chrono::Utc;
use tracing::{error, info, warn};

use conveyor_config::ConfigLoader;
use conveyor_core::CoreResult;
use conveyor_jobs::{LeaseReaper, RetryScheduler};
use conveyor_server::{connect_queue, connect_store, init_logging, shutdown_token};

#[tokio::main]
async fn main() {
    let config = match ConfigLoader::from_default_location().load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.app.log_level);
    conveyor_jobs::register_metrics();

    info!("Starting Conveyor scheduler...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Scheduler error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: conveyor_config::AppConfig) -> CoreResult<()> {
    let store = connect_store(&config).await?;
    let queue = connect_queue(&config).await?;

    let scheduler = RetryScheduler::new(store.clone(), queue.clone(), config.jobs.queue_name.clone())
        .with_batch_limit(config.jobs.scheduler.batch_limit);
    let reaper = LeaseReaper::new(store, queue, config.jobs.queue_name.clone())
        .with_batch_limit(config.jobs.scheduler.batch_limit);

    let shutdown = shutdown_token();
    let mut ticker = tokio::time::interval(config.jobs.scheduler.tick_interval());
    info!(
        queue = %config.jobs.queue_name,
        tick_ms = config.jobs.scheduler.tick_interval().as_millis() as u64,
        "Scheduler ready"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let seed: u64 = rand::random();
                if let Err(e) = scheduler.tick(now, seed).await {
                    warn!(error = %e, "Scheduler tick failed");
                }
                if let Err(e) = reaper.requeue_expired_leases(now).await {
                    warn!(error = %e, "Requeue expired leases failed");
                }
            }
            _ = shutdown.cancelled() => {
                info!("Scheduler shutdown complete");
                return Ok(());
            }
        }
    }
}
