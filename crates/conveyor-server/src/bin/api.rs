//! Conveyor API server: submission, status, DLQ, and stats endpoints.

use tracing::{error, info};

use conveyor_config::ConfigLoader;
use conveyor_core::{CoreError, CoreResult};
use conveyor_rest::{create_router, AppState};
use conveyor_server::{connect_queue, connect_store, init_logging, shutdown_signal};

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

    info!("Starting Conveyor API...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    if let Err(e) = run(config).await {
        error!("API server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: conveyor_config::AppConfig) -> CoreResult<()> {
    let store = connect_store(&config).await?;
    let queue = connect_queue(&config).await?;

    let state = AppState::new(store, queue, config.jobs.queue_name.clone());
    let router = create_router(state);

    let addr = config.server.addr();
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreError::Internal(format!("failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoreError::Internal(format!("server error: {}", e)))?;

    info!("API shutdown complete");
    Ok(())
}
