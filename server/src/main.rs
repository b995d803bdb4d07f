//! Order status relay server.
//!
//! # Usage
//!
//! ```bash
//! RELAY_API_KEY=secret cargo run --bin status-relay
//! ```

use anyhow::Context;
use status_relay_runtime::metrics::MetricsExporter;
use status_relay_server::{Config, build_app};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "status_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        address = %config.server.address(),
        targets = config.targets.len(),
        dead_letter_dir = ?config.dead_letters.dir,
        metrics = config.metrics_enabled,
        "Configuration loaded"
    );

    let metrics = if config.metrics_enabled {
        let mut exporter = MetricsExporter::new();
        exporter.start()?;
        exporter.handle().cloned()
    } else {
        None
    };

    let app = build_app(&config, metrics).await?;

    let listener = tokio::net::TcpListener::bind(config.server.address())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.address()))?;
    info!(address = %config.server.address(), "Starting HTTP server");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        in_flight = app.relay.in_flight(),
        timeout_secs = config.server.shutdown_timeout.as_secs(),
        "HTTP server stopped, draining relay"
    );
    app.relay.shutdown(config.server.shutdown_timeout).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
