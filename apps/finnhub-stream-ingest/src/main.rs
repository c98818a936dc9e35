//! Finnhub Stream Ingest Binary
//!
//! Starts the live trade-stream ingest service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin finnhub-stream-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINNHUB_API_TOKEN`: Finnhub API token
//!
//! ## Optional
//! - `FINNHUB_SYMBOLS`: Comma-separated startup symbols (default: none)
//! - `FINNHUB_WS_URL`: Stream URL (default: wss://ws.finnhub.io)
//! - `READ_DEADLINE_SECS`: Silent-connection deadline, 0 disables (default: 60)
//! - `SINK_QUEUE_CAPACITY`: Per-symbol sink mailbox size (default: 256)
//! - `SINK_WINDOW_SIZE`: Per-symbol recent-trade window (default: 100)
//! - `TRADE_QUEUE_CAPACITY`: Shared feed ring size (default: 10000)
//! - `COMMAND_QUEUE_CAPACITY`: Symbol-switch mailbox size (default: 32)
//! - `HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: finnhub-stream-ingest)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use finnhub_stream_ingest::infrastructure::broadcast::{TradeHub, TradeHubConfig};
use finnhub_stream_ingest::infrastructure::finnhub::{
    IngestClient, IngestClientConfig, IngestStatus, WatchdogConfig,
};
use finnhub_stream_ingest::infrastructure::health::{HealthServer, HealthServerState};
use finnhub_stream_ingest::infrastructure::metrics::set_registry_size;
use finnhub_stream_ingest::infrastructure::router::{EventRouter, SinkConfig, SymbolRegistry};
use finnhub_stream_ingest::infrastructure::telemetry;
use finnhub_stream_ingest::{IngestConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Finnhub Stream Ingest");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = IngestConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared lossy trade feed
    let hub = Arc::new(TradeHub::new(TradeHubConfig {
        capacity: config.queues.trade_feed_capacity,
    }));

    // Per-symbol sink workers
    let sink_config = SinkConfig {
        queue_capacity: config.queues.sink_queue_capacity,
        window_size: config.queues.sink_window_size,
    };
    let registry = Arc::new(SymbolRegistry::new(&config.symbols, sink_config));
    set_registry_size(registry.len());

    let router = EventRouter::new(Arc::clone(&registry), Arc::clone(&hub));

    // Ingest status surface shared with the health server
    let status = Arc::new(IngestStatus::new());

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&status),
        Arc::clone(&registry),
        Arc::clone(&hub),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Ingest client
    let client_config = IngestClientConfig {
        url: config.stream.ws_url.clone(),
        token: config.token.clone(),
        startup_symbols: config.symbols.clone(),
        command_queue_capacity: config.queues.command_queue_capacity,
        watchdog: WatchdogConfig::new(config.stream.read_deadline),
    };

    // The handle stays alive for the whole process so the symbol-switch
    // command path remains open for programmatic callers.
    let (client, _ingest_handle) = IngestClient::new(
        client_config,
        router,
        Arc::clone(&status),
        shutdown_token.clone(),
    );

    let mut ingest_task = tokio::spawn(client.run());

    tracing::info!("Stream ingest ready");

    tokio::select! {
        () = wait_for_signal() => {
            shutdown_token.cancel();
            tracing::info!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Graceful shutdown started"
            );
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut ingest_task).await {
                Ok(Ok(Ok(()))) => tracing::info!("Ingest loop stopped"),
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Ingest loop stopped with error"),
                Ok(Err(e)) => tracing::error!(error = %e, "Ingest task panicked"),
                Err(_) => tracing::error!("Ingest loop did not stop within the shutdown timeout"),
            }
        }
        result = &mut ingest_task => {
            // The upstream connection is gone; there is no reconnect, so
            // the process goes down with it and the supervisor restarts us.
            shutdown_token.cancel();
            match result {
                Ok(Ok(())) => tracing::info!("Upstream connection closed"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Ingest loop failed");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Ingest task panicked");
                    return Err(e.into());
                }
            }
        }
    }

    tracing::info!("Stream ingest stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration. The token never appears here.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        url = %config.stream.ws_url,
        startup_symbols = config.symbols.len(),
        read_deadline_secs = config.stream.read_deadline.as_secs(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        sink_queue_capacity = config.queues.sink_queue_capacity,
        sink_window_size = config.queues.sink_window_size,
        trade_feed_capacity = config.queues.trade_feed_capacity,
        command_queue_capacity = config.queues.command_queue_capacity,
        "Queue sizing"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
