//! Ingest Status Tracking
//!
//! Shared, read-mostly view of the ingest loop's lifecycle and counters.
//! The loop is the only writer; the health server and tests read it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

// =============================================================================
// Ingest State
// =============================================================================

/// Lifecycle states of the ingest loop.
///
/// The loop moves strictly forward: `Connecting → Subscribing → Streaming
/// → Closed`. There is no reconnect; `Closed` is terminal and the process
/// supervisor decides what happens next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestState {
    /// Establishing the WebSocket connection.
    Connecting,
    /// Connection up; sending the startup subscribe list.
    Subscribing,
    /// Reading frames.
    Streaming,
    /// Terminal; nothing further is read or written.
    Closed,
}

impl IngestState {
    /// Stable lower-case label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        }
    }

    /// Whether the loop has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ingest Status
// =============================================================================

/// Shared status handle.
pub type SharedIngestStatus = Arc<IngestStatus>;

/// Lifecycle state and counters for one ingest session.
///
/// Written by the ingest loop at each transition and per-message milestone,
/// read concurrently by the health server.
#[derive(Debug)]
pub struct IngestStatus {
    state: RwLock<IngestState>,
    connected_at: RwLock<Option<DateTime<Utc>>>,
    active_symbol: RwLock<Option<String>>,
    error_message: RwLock<Option<String>>,
    frames_received: AtomicU64,
    trades_emitted: AtomicU64,
    records_skipped: AtomicU64,
    pongs_sent: AtomicU64,
}

impl IngestStatus {
    /// Create a tracker; reports `Connecting` until the loop advances it.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(IngestState::Connecting),
            connected_at: RwLock::new(None),
            active_symbol: RwLock::new(None),
            error_message: RwLock::new(None),
            frames_received: AtomicU64::new(0),
            trades_emitted: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            pongs_sent: AtomicU64::new(0),
        }
    }

    /// Record a state transition.
    ///
    /// Entering `Subscribing` marks the moment the socket came up: the
    /// connected-at timestamp is stamped and any stale error cleared.
    pub fn set_state(&self, state: IngestState) {
        *self.state.write() = state;
        if state == IngestState::Subscribing {
            *self.connected_at.write() = Some(Utc::now());
            *self.error_message.write() = None;
        }
    }

    /// Record the most recent error message.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.error_message.write() = Some(message.into());
    }

    /// Record the symbol a committed switch made active.
    pub fn set_active_symbol(&self, symbol: impl Into<String>) {
        *self.active_symbol.write() = Some(symbol.into());
    }

    /// Count one inbound frame of any kind.
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one emitted trade event.
    pub fn record_trade(&self) {
        self.trades_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one skipped trade record.
    pub fn record_skip(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one keep-alive pong reply.
    pub fn record_pong(&self) {
        self.pongs_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> IngestState {
        *self.state.read()
    }

    /// When the current connection came up, if it ever did.
    #[must_use]
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        *self.connected_at.read()
    }

    /// Symbol made active by the most recent committed switch.
    #[must_use]
    pub fn active_symbol(&self) -> Option<String> {
        self.active_symbol.read().clone()
    }

    /// Most recent error message, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.error_message.read().clone()
    }

    /// Total inbound frames seen this session.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Total trade events emitted this session.
    #[must_use]
    pub fn trades_emitted(&self) -> u64 {
        self.trades_emitted.load(Ordering::Relaxed)
    }

    /// Total records skipped for missing fields this session.
    #[must_use]
    pub fn records_skipped(&self) -> u64 {
        self.records_skipped.load(Ordering::Relaxed)
    }

    /// Total keep-alive pongs sent this session.
    #[must_use]
    pub fn pongs_sent(&self) -> u64 {
        self.pongs_sent.load(Ordering::Relaxed)
    }
}

impl Default for IngestStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting_with_empty_counters() {
        let status = IngestStatus::new();
        assert_eq!(status.state(), IngestState::Connecting);
        assert_eq!(status.connected_at(), None);
        assert_eq!(status.frames_received(), 0);
        assert_eq!(status.trades_emitted(), 0);
    }

    #[test]
    fn entering_subscribing_stamps_connected_at_and_clears_error() {
        let status = IngestStatus::new();
        status.set_error("dial timeout");
        assert!(status.last_error().is_some());

        status.set_state(IngestState::Subscribing);
        assert!(status.connected_at().is_some());
        assert_eq!(status.last_error(), None);
    }

    #[test]
    fn counters_accumulate() {
        let status = IngestStatus::new();
        status.record_frame();
        status.record_frame();
        status.record_trade();
        status.record_skip();
        status.record_pong();

        assert_eq!(status.frames_received(), 2);
        assert_eq!(status.trades_emitted(), 1);
        assert_eq!(status.records_skipped(), 1);
        assert_eq!(status.pongs_sent(), 1);
    }

    #[test]
    fn active_symbol_tracks_latest_commit() {
        let status = IngestStatus::new();
        assert_eq!(status.active_symbol(), None);

        status.set_active_symbol("btcusdt");
        assert_eq!(status.active_symbol(), Some("btcusdt".to_string()));

        status.set_active_symbol("ethusdt");
        assert_eq!(status.active_symbol(), Some("ethusdt".to_string()));
    }

    #[test]
    fn closed_is_the_only_terminal_state() {
        assert!(IngestState::Closed.is_terminal());
        assert!(!IngestState::Connecting.is_terminal());
        assert!(!IngestState::Subscribing.is_terminal());
        assert!(!IngestState::Streaming.is_terminal());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&IngestState::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
    }
}
