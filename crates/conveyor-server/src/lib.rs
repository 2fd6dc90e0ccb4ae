//! Shared process bootstrap for the Conveyor binaries.

use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use conveyor_config::AppConfig;
use conveyor_core::{CoreError, CoreResult};
use conveyor_jobs::{JobStore, PostgresJobStore, ReadyQueue, RedisReadyQueue};

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// conveyor crates and `info` to everything else.
pub fn init_logging(default_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,conveyor={}", default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Connects the Postgres store and runs migrations.
pub async fn connect_store(config: &AppConfig) -> CoreResult<Arc<dyn JobStore>> {
    let pool = conveyor_jobs::postgres::create_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
        config.database.connect_timeout(),
    )
    .await
    .map_err(CoreError::from)?;

    conveyor_jobs::postgres::run_migrations(&pool)
        .await
        .map_err(CoreError::from)?;

    Ok(Arc::new(PostgresJobStore::new(pool)))
}

/// Connects the Redis ready queue.
pub async fn connect_queue(config: &AppConfig) -> CoreResult<Arc<dyn ReadyQueue>> {
    let pool = conveyor_jobs::redis::create_pool(&config.jobs.redis.url, config.jobs.redis.pool_size)
        .await
        .map_err(CoreError::from)?;
    Ok(Arc::new(RedisReadyQueue::new(
        pool,
        &config.jobs.redis.key_prefix,
    )))
}

/// Resolves when SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}

/// Returns a token that fires on SIGINT / SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });
    token
}
