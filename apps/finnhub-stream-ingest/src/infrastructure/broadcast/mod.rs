//! Shared Trade Feed
//!
//! Process-wide fan-out of normalized trades using a tokio broadcast
//! channel. Every [`TradeEvent`] that survives normalization is published
//! here, whether or not a per-symbol sink wanted it, so an external
//! presentation or persistence layer can observe the whole stream.
//!
//! # Backpressure
//!
//! Publishing never blocks the ingest loop. The channel is bounded; a
//! subscriber that falls behind lags and loses the oldest events instead
//! of throttling ingestion. A blocking queue here would stall the
//! keep-alive reply inside the read loop and get the upstream to drop the
//! connection for inactivity, so the lossy variant is the deliberate
//! choice.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::event::TradeEvent;

// =============================================================================
// Trade Hub
// =============================================================================

/// Configuration for the shared trade feed.
#[derive(Debug, Clone, Copy)]
pub struct TradeHubConfig {
    /// Channel capacity; subscribers lagging past it lose oldest events.
    pub capacity: usize,
}

impl Default for TradeHubConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Broadcast hub carrying every normalized trade.
///
/// Supports any number of subscribers; each gets its own cursor into the
/// ring buffer.
///
/// # Example
///
/// ```rust
/// use finnhub_stream_ingest::infrastructure::broadcast::TradeHub;
///
/// let hub = TradeHub::with_defaults();
/// let mut rx = hub.subscribe();
///
/// // In another task: hub.publish(trade);
/// ```
#[derive(Debug)]
pub struct TradeHub {
    trades_tx: broadcast::Sender<TradeEvent>,
}

/// Shared trade hub reference.
pub type SharedTradeHub = Arc<TradeHub>;

impl TradeHub {
    /// Create a hub with the given configuration.
    ///
    /// A zero capacity is bumped to one; the underlying channel rejects
    /// empty ring buffers.
    #[must_use]
    pub fn new(config: TradeHubConfig) -> Self {
        Self {
            trades_tx: broadcast::channel(config.capacity.max(1)).0,
        }
    }

    /// Create a hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(TradeHubConfig::default())
    }

    /// Publish a trade to all subscribers.
    ///
    /// Never blocks. Returns the number of receivers that got the event,
    /// or `None` if there are no active receivers.
    #[must_use]
    pub fn publish(&self, trade: TradeEvent) -> Option<usize> {
        self.trades_tx.send(trade).ok()
    }

    /// Get a new receiver for the trade feed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.trades_tx.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.trades_tx.receiver_count()
    }
}

impl Default for TradeHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// =============================================================================
// Tests
// =============================================================================
