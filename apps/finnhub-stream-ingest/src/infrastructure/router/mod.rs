//! Event Router
//!
//! Fans each normalized trade out to the per-symbol sink registered for it
//! and unconditionally publishes it on the shared trade feed. The sink
//! registry is built once at startup from the configured symbol list and
//! never changes afterwards, so hot-path lookups are plain map reads with
//! no locking and no task spawning.
//!
//! Trades for symbols with no registered sink still reach the shared feed;
//! the router reports them as unrouted so the caller can count them.

pub mod sink;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::event::{MarkStat, TradeEvent};
use crate::infrastructure::broadcast::SharedTradeHub;

pub use sink::{SinkConfig, SinkDeliverError, SinkHandle, SinkMessage, SinkSnapshot};

// =============================================================================
// Symbol Registry
// =============================================================================

/// Fixed set of symbol sinks, keyed by canonical lower-case symbol.
///
/// Built once before ingestion starts; the sink set cannot grow or shrink
/// at runtime. Duplicate symbols in the input collapse to one sink.
#[derive(Debug)]
pub struct SymbolRegistry {
    sinks: Vec<SinkHandle>,
    index: HashMap<String, usize>,
}

impl SymbolRegistry {
    /// Build the registry and spawn one consumer task per symbol.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(symbols: &[String], config: SinkConfig) -> Self {
        let mut sinks = Vec::with_capacity(symbols.len());
        let mut index = HashMap::with_capacity(symbols.len());

        for symbol in symbols {
            let canonical = symbol.to_lowercase();
            if index.contains_key(&canonical) {
                continue;
            }
            let handle = SinkHandle::spawn(&canonical, config);
            index.insert(canonical, sinks.len());
            sinks.push(handle);
        }

        Self { sinks, index }
    }

    /// Build a registry around pre-made handles. Lets tests control the
    /// consumer side of each mailbox.
    #[cfg(test)]
    pub(crate) fn from_handles(handles: Vec<SinkHandle>) -> Self {
        let index = handles
            .iter()
            .enumerate()
            .map(|(i, h)| (h.symbol().to_string(), i))
            .collect();
        Self {
            sinks: handles,
            index,
        }
    }

    /// Look up the sink for a canonical lower-case symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&SinkHandle> {
        self.index.get(symbol).map(|&i| &self.sinks[i])
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether the registry holds no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Registered symbols, in registration order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.sinks.iter().map(SinkHandle::symbol)
    }

    /// Snapshot every sink, in registration order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SinkSnapshot> {
        self.sinks.iter().map(SinkHandle::snapshot).collect()
    }
}

// =============================================================================
// Event Router
// =============================================================================

/// Where a routed trade ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to the symbol's sink (and the shared feed).
    Sink,
    /// A sink exists but refused delivery; shared feed only.
    SinkDropped,
    /// No sink registered for the symbol; shared feed only.
    Unrouted,
}

impl RouteOutcome {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sink => "sink",
            Self::SinkDropped => "sink_dropped",
            Self::Unrouted => "unrouted",
        }
    }
}

/// Routes normalized events to sinks and the shared feed.
#[derive(Debug, Clone)]
pub struct EventRouter {
    registry: Arc<SymbolRegistry>,
    hub: SharedTradeHub,
}

impl EventRouter {
    /// Create a router over a registry and the shared feed.
    #[must_use]
    pub fn new(registry: Arc<SymbolRegistry>, hub: SharedTradeHub) -> Self {
        Self { registry, hub }
    }

    /// Route one trade and its derived mark stat.
    ///
    /// Sink delivery is non-blocking: a full or stopped mailbox drops the
    /// event for that sink. The shared feed is published to in every case,
    /// so downstream observers see the complete stream regardless of sink
    /// health.
    pub fn route(&self, trade: TradeEvent, stat: MarkStat) -> RouteOutcome {
        let outcome = match self.registry.get(&trade.pair.symbol) {
            Some(sink) => match sink.try_deliver(SinkMessage::Trade(trade.clone())) {
                Ok(()) => {
                    if let Err(err) = sink.try_deliver(SinkMessage::Stat(stat)) {
                        tracing::warn!(
                            symbol = %trade.pair.symbol,
                            error = %err,
                            "Dropping mark stat"
                        );
                    }
                    RouteOutcome::Sink
                }
                Err(err) => {
                    tracing::warn!(
                        symbol = %trade.pair.symbol,
                        error = %err,
                        "Dropping trade for sink"
                    );
                    RouteOutcome::SinkDropped
                }
            },
            None => {
                tracing::debug!(symbol = %trade.pair.symbol, "No sink for symbol");
                RouteOutcome::Unrouted
            }
        };

        // Routed or not, every trade reaches the shared feed.
        let _ = self.hub.publish(trade);

        outcome
    }

    /// Registry backing this router.
    #[must_use]
    pub fn registry(&self) -> &Arc<SymbolRegistry> {
        &self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::event::{Pair, TradeSide};
    use crate::infrastructure::broadcast::TradeHub;

    fn make_trade(symbol: &str, price: f64) -> TradeEvent {
        TradeEvent::new(
            Pair::new("finnhub", symbol),
            price,
            2.0,
            TradeSide::Buy,
            1_700_000_000_000,
        )
    }

    fn make_pairing(symbol: &str, price: f64) -> (TradeEvent, MarkStat) {
        let trade = make_trade(symbol, price);
        let stat = MarkStat::from_trade(&trade);
        (trade, stat)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn registry_lowercases_and_deduplicates() {
        let symbols = vec![
            "BTCUSDT".to_string(),
            "btcusdt".to_string(),
            "ETHUSDT".to_string(),
        ];
        let registry = SymbolRegistry::new(&symbols, SinkConfig::default());

        assert_eq!(registry.len(), 2);
        assert!(registry.get("btcusdt").is_some());
        assert!(registry.get("ethusdt").is_some());
        // Lookups are by canonical form only.
        assert!(registry.get("BTCUSDT").is_none());

        let listed: Vec<&str> = registry.symbols().collect();
        assert_eq!(listed, vec!["btcusdt", "ethusdt"]);
    }

    #[tokio::test]
    async fn routes_trade_and_stat_to_registered_sink() {
        let symbols = vec!["btcusdt".to_string()];
        let registry = Arc::new(SymbolRegistry::new(&symbols, SinkConfig::default()));
        let hub = Arc::new(TradeHub::with_defaults());
        let mut feed = hub.subscribe();
        let router = EventRouter::new(Arc::clone(&registry), hub);

        let (trade, stat) = make_pairing("btcusdt", 42_000.0);
        let outcome = router.route(trade, stat);
        assert_eq!(outcome, RouteOutcome::Sink);

        // Shared feed sees it too.
        let published = feed.try_recv().unwrap();
        assert_eq!(published.pair.symbol, "btcusdt");

        settle().await;
        let snapshot = registry.get("btcusdt").unwrap().snapshot();
        assert_eq!(snapshot.trades_seen, 1);
        assert_eq!(snapshot.stats_seen, 1);
        assert_eq!(snapshot.latest_mark_price, Some(42_000.0));
    }

    #[tokio::test]
    async fn unregistered_symbol_still_reaches_shared_feed() {
        let registry = Arc::new(SymbolRegistry::new(
            &["btcusdt".to_string()],
            SinkConfig::default(),
        ));
        let hub = Arc::new(TradeHub::with_defaults());
        let mut feed = hub.subscribe();
        let router = EventRouter::new(registry, hub);

        let (trade, stat) = make_pairing("dogeusdt", 0.1);
        let outcome = router.route(trade, stat);

        assert_eq!(outcome, RouteOutcome::Unrouted);
        assert_eq!(feed.try_recv().unwrap().pair.symbol, "dogeusdt");
    }

    #[tokio::test]
    async fn full_mailbox_drops_sink_delivery_but_not_broadcast() {
        let config = SinkConfig {
            queue_capacity: 1,
            window_size: 10,
        };
        let (handle, _rx) = SinkHandle::detached("btcusdt", config);
        let registry = Arc::new(SymbolRegistry::from_handles(vec![handle]));
        let hub = Arc::new(TradeHub::with_defaults());
        let mut feed = hub.subscribe();
        let router = EventRouter::new(registry, hub);

        // First route fills the single-slot mailbox with the trade; the
        // stat overflowed but the trade landed, so the outcome is Sink.
        let (trade, stat) = make_pairing("btcusdt", 1.0);
        assert_eq!(router.route(trade, stat), RouteOutcome::Sink);

        // Second route cannot even place the trade.
        let (trade, stat) = make_pairing("btcusdt", 2.0);
        assert_eq!(router.route(trade, stat), RouteOutcome::SinkDropped);

        // Both trades made the shared feed regardless.
        assert!(feed.try_recv().is_ok());
        assert!(feed.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stopped_consumer_reports_dropped() {
        let (handle, rx) = SinkHandle::detached("btcusdt", SinkConfig::default());
        drop(rx);
        let registry = Arc::new(SymbolRegistry::from_handles(vec![handle]));
        let hub = Arc::new(TradeHub::with_defaults());
        let router = EventRouter::new(registry, hub);

        let (trade, stat) = make_pairing("btcusdt", 1.0);
        assert_eq!(router.route(trade, stat), RouteOutcome::SinkDropped);
    }

    #[tokio::test]
    async fn snapshots_cover_every_registered_symbol() {
        let symbols = vec!["aapl".to_string(), "msft".to_string()];
        let registry = SymbolRegistry::new(&symbols, SinkConfig::default());

        let snapshots = registry.snapshots();
        let names: Vec<&str> = snapshots.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["aapl", "msft"]);
        assert!(snapshots.iter().all(|s| s.trades_seen == 0));
    }
}
