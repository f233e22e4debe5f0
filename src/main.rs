//! botcore host process
//!
//! Builds the shared components, runs monitoring and the periodic health
//! check, and tears everything down on shutdown.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use botcore::tasks::spawn_health_check_task;
use botcore::{AppState, Config, MonitorEvent};

/// Startup sequence:
/// 1. Initialize tracing
/// 2. Load configuration from environment variables
/// 3. Build cache, limiters, plugin manager and monitor
/// 4. Start monitoring and the health check loop
/// 5. Wait for Ctrl+C, SIGTERM or a restart request, then shut down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botcore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting botcore");

    let config = Config::from_env();
    info!(
        "Configuration loaded: cache_max_size={}, default_ttl={}ms, commands_per_minute={}, health_interval={}ms",
        config.cache.max_size,
        config.cache.default_ttl.as_millis(),
        config.limits.max_commands_per_minute,
        config.monitoring.health_check_interval.as_millis()
    );

    let state = AppState::from_config(&config).await;
    let restarts = state.monitor.subscribe();

    state.monitor.start().await;
    let health = spawn_health_check_task(state.clone(), config.monitoring.health_check_interval);
    info!("Background tasks started");

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = restart_requested(restarts) => {
            warn!("Monitor requested a restart, shutting down");
        }
    }

    health.abort();
    state.shutdown().await;
    Ok(())
}

/// Resolves on the first `RestartRequested` event.
async fn restart_requested(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::RestartRequested(_)) => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
