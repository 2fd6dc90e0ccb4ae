//! Conveyor worker: leases jobs, executes them under heartbeat, commits the
//! outcome.

use futures::FutureExt;
use std::sync::Arc;
use tracing::{error, info};

use conveyor_config::ConfigLoader;
use conveyor_core::{CoreError, CoreResult};
use conveyor_jobs::{
    generate_worker_id, terminal, Executor, JobContext, Throttler, WorkerLoop,
};
use conveyor_server::{connect_store, init_logging, shutdown_token};

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

    info!("Starting Conveyor worker...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Worker error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: conveyor_config::AppConfig) -> CoreResult<()> {
    let store = connect_store(&config).await?;

    let worker_id = generate_worker_id();
    let throttler = Arc::new(Throttler::new(
        config.jobs.queue_name.clone(),
        config.jobs.worker.concurrency,
        config.jobs.worker.rate_limit_per_sec,
    ));
    let classifier = config.jobs.classifier.build().map_err(CoreError::from)?;

    let worker_loop = WorkerLoop::new(
        store,
        config.jobs.queue_name.clone(),
        worker_id.clone(),
        config.jobs.worker.lease_for(),
    )
    .with_poll_interval(config.jobs.worker.poll_interval())
    .with_throttler(throttler)
    .with_classifier(classifier);

    info!(worker_id = %worker_id, queue = %config.jobs.queue_name, "Worker ready");

    let shutdown = shutdown_token();
    worker_loop
        .run(shutdown, dispatch_executor())
        .await
        .map_err(CoreError::from)?;

    info!("Worker shutdown complete");
    Ok(())
}

/// Dispatches executions by job type.
///
/// Deployments register their own job types here; unknown types are terminal
/// so misrouted jobs land in the DLQ instead of retrying forever.
fn dispatch_executor() -> Executor {
    Arc::new(|ctx: JobContext| {
        async move {
            match ctx.job_type.as_str() {
                "demo" => {
                    info!(
                        job_id = %ctx.job_id,
                        attempt = ctx.attempt,
                        payload = %ctx.payload,
                        "Demo job executed"
                    );
                    Ok(())
                }
                other => Err(terminal(anyhow::anyhow!(
                    "no executor registered for job type {}",
                    other
                ))),
            }
        }
        .boxed()
    })
}
