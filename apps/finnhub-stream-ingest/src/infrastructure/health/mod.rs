//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, ingest status reporting, and Prometheus
//! metrics. Used by container orchestrators, load balancers, and monitoring
//! systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the stream)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::broadcast::SharedTradeHub;
use crate::infrastructure::finnhub::status::{IngestState, SharedIngestStatus};
use crate::infrastructure::metrics::{get_metrics_handle, set_feed_receivers};
use crate::infrastructure::router::{SinkSnapshot, SymbolRegistry};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream ingest status.
    pub ingest: IngestInfo,
    /// Per-symbol sink statistics.
    pub sinks: Vec<SinkSnapshot>,
    /// Shared trade feed statistics.
    pub shared_feed: SharedFeedStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Trades are streaming.
    Healthy,
    /// Still connecting or subscribing.
    Degraded,
    /// The stream is gone.
    Unhealthy,
}

/// Upstream connection and counter snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IngestInfo {
    /// Lifecycle state.
    pub state: IngestState,
    /// When the connection reached the subscribing phase.
    pub connected_at: Option<DateTime<Utc>>,
    /// Most recently committed switch target.
    pub active_symbol: Option<String>,
    /// Text frames received.
    pub frames_received: u64,
    /// Trades normalized and routed.
    pub trades_emitted: u64,
    /// Records skipped for missing fields.
    pub records_skipped: u64,
    /// Keep-alive pongs sent.
    pub pongs_sent: u64,
    /// Most recent fatal error, if any.
    pub last_error: Option<String>,
}

/// Shared trade feed statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SharedFeedStatus {
    /// Active receivers on the shared broadcast feed.
    pub receivers: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    status: SharedIngestStatus,
    registry: Arc<SymbolRegistry>,
    hub: SharedTradeHub,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        status: SharedIngestStatus,
        registry: Arc<SymbolRegistry>,
        hub: SharedTradeHub,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            status,
            registry,
            hub,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    // Ready only once trades can actually flow.
    if state.status.state() == IngestState::Streaming {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    // The feed receiver count moves on its own; sample it per scrape.
    set_feed_receivers(state.hub.receiver_count());

    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let ingest_state = state.status.state();

    HealthResponse {
        status: determine_health_status(ingest_state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        ingest: IngestInfo {
            state: ingest_state,
            connected_at: state.status.connected_at(),
            active_symbol: state.status.active_symbol(),
            frames_received: state.status.frames_received(),
            trades_emitted: state.status.trades_emitted(),
            records_skipped: state.status.records_skipped(),
            pongs_sent: state.status.pongs_sent(),
            last_error: state.status.last_error(),
        },
        sinks: state.registry.snapshots(),
        shared_feed: SharedFeedStatus {
            receivers: state.hub.receiver_count(),
        },
    }
}

const fn determine_health_status(state: IngestState) -> HealthStatus {
    match state {
        IngestState::Streaming => HealthStatus::Healthy,
        IngestState::Connecting | IngestState::Subscribing => HealthStatus::Degraded,
        IngestState::Closed => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::broadcast::TradeHub;
    use crate::infrastructure::finnhub::status::IngestStatus;
    use crate::infrastructure::router::SinkConfig;

    fn make_state(status: Arc<IngestStatus>, symbols: &[String]) -> HealthServerState {
        HealthServerState::new(
            "0.1.0-test".to_string(),
            status,
            Arc::new(SymbolRegistry::new(symbols, SinkConfig::default())),
            Arc::new(TradeHub::with_defaults()),
        )
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn streaming_is_healthy() {
        assert_eq!(
            determine_health_status(IngestState::Streaming),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn startup_phases_are_degraded() {
        assert_eq!(
            determine_health_status(IngestState::Connecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(IngestState::Subscribing),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn closed_is_unhealthy() {
        assert_eq!(
            determine_health_status(IngestState::Closed),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn response_reflects_ingest_surface() {
        let status = Arc::new(IngestStatus::new());
        status.set_state(IngestState::Subscribing);
        status.set_state(IngestState::Streaming);
        status.set_active_symbol("btcusdt");
        status.record_frame();
        status.record_trade();

        let state = make_state(Arc::clone(&status), &["btcusdt".to_string()]);
        let response = build_health_response(&state);

        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.version, "0.1.0-test");
        assert_eq!(response.ingest.state, IngestState::Streaming);
        assert!(response.ingest.connected_at.is_some());
        assert_eq!(response.ingest.active_symbol.as_deref(), Some("btcusdt"));
        assert_eq!(response.ingest.frames_received, 1);
        assert_eq!(response.ingest.trades_emitted, 1);
        assert_eq!(response.ingest.last_error, None);
        assert_eq!(response.sinks.len(), 1);
        assert_eq!(response.sinks[0].symbol, "btcusdt");
        assert_eq!(response.shared_feed.receivers, 0);
    }

    #[tokio::test]
    async fn closed_response_carries_the_error() {
        let status = Arc::new(IngestStatus::new());
        status.set_error("connection stalled for 60s");
        status.set_state(IngestState::Closed);

        let state = make_state(status, &[]);
        let response = build_health_response(&state);

        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(
            response.ingest.last_error.as_deref(),
            Some("connection stalled for 60s")
        );
        assert!(response.sinks.is_empty());
    }
}
