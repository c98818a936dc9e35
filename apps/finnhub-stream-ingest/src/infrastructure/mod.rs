//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer owns every boundary the domain logic must not touch: the
//! upstream WebSocket, channels, HTTP surfaces, configuration, and
//! observability plumbing.

/// Shared lossy broadcast feed for normalized trades.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// Finnhub WebSocket client adapter.
pub mod finnhub;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Per-symbol event routing and sink workers.
pub mod router;

/// OpenTelemetry tracing integration.
pub mod telemetry;
