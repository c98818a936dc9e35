//! Per-Symbol Sinks
//!
//! A sink is the delivery target for one symbol: a bounded mailbox, a
//! consumer task draining it in FIFO order, and a small state block the
//! consumer maintains (a sliding window of recent trades, the latest
//! mark-price stat, and counters). The router holds a [`SinkHandle`] per
//! registered symbol and delivers with a non-blocking [`SinkHandle::try_deliver`];
//! a full mailbox drops the event rather than stalling ingestion.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::event::{MarkStat, TradeEvent};

// =============================================================================
// Types
// =============================================================================

/// One delivery into a symbol sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    /// A normalized trade for this symbol.
    Trade(TradeEvent),
    /// The mark-price stat derived from that trade.
    Stat(MarkStat),
}

/// Sizing for a symbol sink.
#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    /// Mailbox capacity; deliveries beyond it are dropped.
    pub queue_capacity: usize,
    /// How many recent trades the sink retains.
    pub window_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            window_size: 100,
        }
    }
}

/// Why a delivery did not reach the sink.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkDeliverError {
    /// The mailbox is at capacity; the consumer is behind.
    #[error("sink mailbox is full")]
    MailboxFull,
    /// The consumer task has stopped.
    #[error("sink consumer has stopped")]
    Stopped,
}

/// Point-in-time view of a sink, served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SinkSnapshot {
    /// Symbol this sink serves.
    pub symbol: String,
    /// Trades the consumer has processed.
    pub trades_seen: u64,
    /// Mark stats the consumer has processed.
    pub stats_seen: u64,
    /// Current length of the recent-trade window.
    pub window_len: usize,
    /// Mark price from the most recent stat, if any arrived yet.
    pub latest_mark_price: Option<f64>,
}

// =============================================================================
// Sink State
// =============================================================================

/// State maintained by the consumer task, readable from any thread.
#[derive(Debug)]
struct SinkState {
    window: RwLock<VecDeque<TradeEvent>>,
    latest_stat: RwLock<Option<MarkStat>>,
    trades_seen: AtomicU64,
    stats_seen: AtomicU64,
    window_capacity: usize,
}

impl SinkState {
    fn new(window_capacity: usize) -> Self {
        Self {
            window: RwLock::new(VecDeque::with_capacity(window_capacity)),
            latest_stat: RwLock::new(None),
            trades_seen: AtomicU64::new(0),
            stats_seen: AtomicU64::new(0),
            window_capacity,
        }
    }

    fn push_trade(&self, trade: TradeEvent) {
        let mut window = self.window.write();
        window.push_back(trade);
        while window.len() > self.window_capacity {
            window.pop_front();
        }
        drop(window);
        self.trades_seen.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stat(&self, stat: MarkStat) {
        *self.latest_stat.write() = Some(stat);
        self.stats_seen.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Sink Handle
// =============================================================================

/// Sender half of a symbol sink plus read access to its state.
///
/// Cloning is cheap; all clones feed the same consumer.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    symbol: String,
    tx: mpsc::Sender<SinkMessage>,
    state: Arc<SinkState>,
}

impl SinkHandle {
    /// Create the sink for `symbol` and spawn its consumer task.
    ///
    /// The consumer runs until every handle clone is dropped. Must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn spawn(symbol: &str, config: SinkConfig) -> Self {
        let symbol = symbol.to_lowercase();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let state = Arc::new(SinkState::new(config.window_size));

        tokio::spawn(consume(symbol.clone(), rx, Arc::clone(&state)));

        Self { symbol, tx, state }
    }

    /// Build a handle whose mailbox has no consumer, handing back the
    /// receiver so tests can inspect or drop it.
    #[cfg(test)]
    pub(crate) fn detached(symbol: &str, config: SinkConfig) -> (Self, mpsc::Receiver<SinkMessage>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = Self {
            symbol: symbol.to_lowercase(),
            tx,
            state: Arc::new(SinkState::new(config.window_size)),
        };
        (handle, rx)
    }

    /// Symbol this sink serves.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Deliver without blocking.
    ///
    /// # Errors
    ///
    /// [`SinkDeliverError::MailboxFull`] when the mailbox is at capacity,
    /// [`SinkDeliverError::Stopped`] when the consumer is gone. Either way
    /// the message is dropped; the caller decides whether to count or log.
    pub fn try_deliver(&self, message: SinkMessage) -> Result<(), SinkDeliverError> {
        self.tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SinkDeliverError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => SinkDeliverError::Stopped,
        })
    }

    /// Point-in-time view of the sink's state.
    #[must_use]
    pub fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            symbol: self.symbol.clone(),
            trades_seen: self.state.trades_seen.load(Ordering::Relaxed),
            stats_seen: self.state.stats_seen.load(Ordering::Relaxed),
            window_len: self.state.window.read().len(),
            latest_mark_price: self.state.latest_stat.read().as_ref().map(|s| s.mark_price),
        }
    }

    /// Recent trades, oldest first.
    #[must_use]
    pub fn recent_trades(&self) -> Vec<TradeEvent> {
        self.state.window.read().iter().cloned().collect()
    }

    /// Latest mark stat, if any arrived yet.
    #[must_use]
    pub fn latest_stat(&self) -> Option<MarkStat> {
        self.state.latest_stat.read().clone()
    }
}

// =============================================================================
// Consumer Task
// =============================================================================

/// Drain the mailbox in FIFO order until all senders are dropped.
async fn consume(symbol: String, mut rx: mpsc::Receiver<SinkMessage>, state: Arc<SinkState>) {
    tracing::debug!(symbol = %symbol, "Symbol sink started");

    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Trade(trade) => {
                tracing::debug!(
                    symbol = %symbol,
                    price = trade.price,
                    quantity = trade.quantity,
                    side = %trade.side,
                    "Trade"
                );
                state.push_trade(trade);
            }
            SinkMessage::Stat(stat) => {
                tracing::debug!(symbol = %symbol, mark_price = stat.mark_price, "Mark stat");
                state.record_stat(stat);
            }
        }
    }

    tracing::debug!(symbol = %symbol, "Symbol sink stopped");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::event::{Pair, TradeSide};

    fn make_trade(symbol: &str, price: f64, timestamp: i64) -> TradeEvent {
        TradeEvent::new(
            Pair::new("finnhub", symbol),
            price,
            1.0,
            TradeSide::Buy,
            timestamp,
        )
    }

    /// Give the consumer task a moment to drain.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn consumer_processes_trades_in_order() {
        let sink = SinkHandle::spawn("BTCUSDT", SinkConfig::default());
        assert_eq!(sink.symbol(), "btcusdt");

        for i in 0..3 {
            sink.try_deliver(SinkMessage::Trade(make_trade("btcusdt", 100.0 + f64::from(i), i64::from(i))))
                .unwrap();
        }
        settle().await;

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.trades_seen, 3);
        assert_eq!(snapshot.window_len, 3);

        let trades = sink.recent_trades();
        let timestamps: Vec<i64> = trades.iter().map(|t| t.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn window_retains_only_most_recent_trades() {
        let config = SinkConfig {
            queue_capacity: 32,
            window_size: 3,
        };
        let sink = SinkHandle::spawn("aapl", config);

        for i in 0..5 {
            sink.try_deliver(SinkMessage::Trade(make_trade("aapl", 10.0, i64::from(i))))
                .unwrap();
        }
        settle().await;

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.trades_seen, 5);
        assert_eq!(snapshot.window_len, 3);

        let timestamps: Vec<i64> = sink.recent_trades().iter().map(|t| t.timestamp).collect();
        assert_eq!(timestamps, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn latest_stat_is_overwritten_not_accumulated() {
        let sink = SinkHandle::spawn("ethusdt", SinkConfig::default());

        for price in [10.0, 20.0, 30.0] {
            let trade = make_trade("ethusdt", price, 1);
            sink.try_deliver(SinkMessage::Stat(MarkStat::from_trade(&trade)))
                .unwrap();
        }
        settle().await;

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.stats_seen, 3);
        assert_eq!(snapshot.latest_mark_price, Some(30.0));
        assert_eq!(snapshot.window_len, 0);
    }

    #[tokio::test]
    async fn full_mailbox_rejects_delivery() {
        let config = SinkConfig {
            queue_capacity: 2,
            window_size: 10,
        };
        let (sink, _rx) = SinkHandle::detached("btcusdt", config);

        sink.try_deliver(SinkMessage::Trade(make_trade("btcusdt", 1.0, 1)))
            .unwrap();
        sink.try_deliver(SinkMessage::Trade(make_trade("btcusdt", 2.0, 2)))
            .unwrap();

        let err = sink
            .try_deliver(SinkMessage::Trade(make_trade("btcusdt", 3.0, 3)))
            .unwrap_err();
        assert_eq!(err, SinkDeliverError::MailboxFull);
    }

    #[tokio::test]
    async fn stopped_consumer_rejects_delivery() {
        let (sink, rx) = SinkHandle::detached("btcusdt", SinkConfig::default());
        drop(rx);

        let err = sink
            .try_deliver(SinkMessage::Trade(make_trade("btcusdt", 1.0, 1)))
            .unwrap_err();
        assert_eq!(err, SinkDeliverError::Stopped);
    }
}
