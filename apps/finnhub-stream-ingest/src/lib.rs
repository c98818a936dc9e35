#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Finnhub Stream Ingest - Live Trade Feed Core
//!
//! An ingest service that holds a single WebSocket connection to Finnhub's
//! trade stream, normalizes every raw trade into a canonical event with an
//! inferred direction, and fans the events out to per-symbol sink workers
//! plus one shared lossy feed.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure trade-stream logic, no I/O
//!   - `event`: Canonical trade and mark-price types
//!   - `normalize`: Raw-record validation and direction inference
//!   - `subscription`: Active-symbol switch planning
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: WebSocket client, codec, watchdog, status surface
//!   - `router`: Per-symbol sinks and the event router
//!   - `broadcast`: Shared lossy trade feed
//!   - `config`: Environment-driven configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Finnhub WS ──► Ingest Loop ──► Normalizer ──► Router ──┬──► sink "btcusdt"
//!                     ▲                                  ├──► sink "ethusdt"
//!                     │                                  │
//!               IngestHandle                             └──► shared feed ──► receivers
//!              (symbol switch)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core trade-stream types with no external dependencies.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::{MarkStat, Pair, TradeEvent, TradeSide};
pub use domain::normalize::{NormalizedTrade, RawTradeRecord, RecordDefect, TradeNormalizer};
pub use domain::subscription::{SubscriptionManager, SwitchPlan, Symbol};

// Infrastructure config
pub use infrastructure::config::{
    ApiToken, ConfigError, IngestConfig, QueueSettings, ServerSettings, StreamSettings,
};

// Finnhub client (for integration tests)
pub use infrastructure::finnhub::{
    CommandError, ControlMessage, Frame, FrameCodec, IngestClient, IngestClientConfig,
    IngestClientError, IngestCommand, IngestHandle, IngestState, IngestStatus, SharedIngestStatus,
    WatchdogConfig,
};

// Event routing
pub use infrastructure::router::{
    EventRouter, RouteOutcome, SinkConfig, SinkHandle, SinkMessage, SinkSnapshot, SymbolRegistry,
};

// Shared trade feed
pub use infrastructure::broadcast::{SharedTradeHub, TradeHub, TradeHubConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
