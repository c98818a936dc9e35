//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Counts of inbound frames by kind and decode failures
//! - **Trades**: Normalized trades by side, skipped records by reason
//! - **Routing**: Event delivery outcomes and keep-alive replies
//! - **State**: Ingest state machine position and fan-out sizes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::event::TradeSide;
use crate::infrastructure::finnhub::status::IngestState;
use crate::infrastructure::router::RouteOutcome;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once or if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "finnhub_ingest_frames_received_total",
        "Total inbound frames by kind"
    );
    describe_counter!(
        "finnhub_ingest_decode_errors_total",
        "Total inbound frames that failed to decode"
    );

    // Trade counters
    describe_counter!(
        "finnhub_ingest_trades_normalized_total",
        "Total trades normalized, by inferred side"
    );
    describe_counter!(
        "finnhub_ingest_records_skipped_total",
        "Total raw records skipped, by missing field"
    );

    // Routing counters
    describe_counter!(
        "finnhub_ingest_events_routed_total",
        "Total normalized events routed, by delivery outcome"
    );
    describe_counter!(
        "finnhub_ingest_pongs_sent_total",
        "Total keep-alive pong replies sent upstream"
    );
    describe_counter!(
        "finnhub_ingest_symbol_switches_total",
        "Total symbol switch commands, by outcome"
    );

    // State gauges
    describe_gauge!(
        "finnhub_ingest_state",
        "Ingest state machine position (0=connecting 1=subscribing 2=streaming 3=closed)"
    );
    describe_gauge!(
        "finnhub_ingest_registry_size",
        "Number of registered per-symbol sinks"
    );
    describe_gauge!(
        "finnhub_ingest_feed_receivers",
        "Active subscribers on the shared trade feed"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for inbound frame kinds.
#[derive(Debug, Clone, Copy)]
pub enum FrameKind {
    /// Trade batch frame.
    Trade,
    /// Keep-alive ping frame.
    Ping,
    /// Frame with an unrecognized type tag.
    Unknown,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        }
    }
}

/// Metric labels for symbol switch outcomes.
#[derive(Debug, Clone, Copy)]
pub enum SwitchOutcome {
    /// Subscribe sent; the new symbol is active.
    Committed,
    /// Subscribe send failed; the previous state was not claimed.
    Aborted,
}

impl SwitchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

/// Record an inbound frame.
pub fn record_frame_received(kind: FrameKind) {
    counter!(
        "finnhub_ingest_frames_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an inbound frame that failed to decode.
pub fn record_decode_error() {
    counter!("finnhub_ingest_decode_errors_total").increment(1);
}

/// Record a normalized trade.
pub fn record_trade_normalized(side: TradeSide) {
    counter!(
        "finnhub_ingest_trades_normalized_total",
        "side" => side.as_str()
    )
    .increment(1);
}

/// Record a raw record skipped during normalization.
pub fn record_skipped_record(reason: &'static str) {
    counter!(
        "finnhub_ingest_records_skipped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record the delivery outcome of a routed event.
pub fn record_event_routed(outcome: RouteOutcome) {
    counter!(
        "finnhub_ingest_events_routed_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a keep-alive pong reply.
pub fn record_pong_sent() {
    counter!("finnhub_ingest_pongs_sent_total").increment(1);
}

/// Record a symbol switch attempt.
pub fn record_symbol_switch(outcome: SwitchOutcome) {
    counter!(
        "finnhub_ingest_symbol_switches_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Publish the ingest state machine position.
pub fn set_ingest_state(state: IngestState) {
    gauge!("finnhub_ingest_state").set(state_value(state));
}

const fn state_value(state: IngestState) -> f64 {
    match state {
        IngestState::Connecting => 0.0,
        IngestState::Subscribing => 1.0,
        IngestState::Streaming => 2.0,
        IngestState::Closed => 3.0,
    }
}

/// Publish the number of registered sinks.
#[allow(clippy::cast_precision_loss)]
pub fn set_registry_size(count: usize) {
    gauge!("finnhub_ingest_registry_size").set(count as f64);
}

/// Publish the shared feed's receiver count.
#[allow(clippy::cast_precision_loss)]
pub fn set_feed_receivers(count: usize) {
    gauge!("finnhub_ingest_feed_receivers").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
