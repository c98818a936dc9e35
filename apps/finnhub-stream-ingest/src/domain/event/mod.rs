//! Canonical Market Data Events
//!
//! Domain types for normalized trade and mark-price events. These are the
//! values the rest of the system routes, broadcasts, and stores: every raw
//! exchange record that survives validation becomes exactly one
//! [`TradeEvent`] and one derived [`MarkStat`].
//!
//! # Design
//!
//! - [`Pair`] is the routing key: exchange + symbol, both lower-cased at
//!   construction so lookups never depend on caller casing.
//! - Events are immutable after creation. Fan-out clones them per
//!   recipient; nothing downstream can mutate another consumer's copy.
//! - Price and quantity stay `f64` and timestamps stay `i64`, preserving
//!   the wire values at source-native resolution (Finnhub reports UNIX
//!   milliseconds).

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Pair
// =============================================================================

/// Exchange + symbol routing key.
///
/// Both components are canonical lower-case strings. Two `Pair`s compare
/// equal iff they identify the same instrument on the same venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Venue identifier (e.g. `"finnhub"`).
    pub exchange: String,
    /// Instrument symbol (e.g. `"btcusdt"`).
    pub symbol: String,
}

impl Pair {
    /// Create a pair, lower-casing both components.
    #[must_use]
    pub fn new(exchange: &str, symbol: &str) -> Self {
        Self {
            exchange: exchange.to_lowercase(),
            symbol: symbol.to_lowercase(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

// =============================================================================
// Trade Side
// =============================================================================

/// Inferred trade direction.
///
/// This venue does not report a taker side; the normalizer infers one with
/// a simplified uptick rule (at-or-above previous price → buy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Trade priced at or above the previous trade (or no prior price).
    Buy,
    /// Trade priced below the previous trade.
    Sell,
}

impl TradeSide {
    /// Whether this side is a buy.
    #[must_use]
    pub const fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }

    /// Stable lower-case label, used for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Trade Event
// =============================================================================

/// One normalized trade.
///
/// Produced by the normalizer for every valid record inside an inbound
/// trade batch; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Routing key for this trade.
    pub pair: Pair,
    /// Execution price.
    pub price: f64,
    /// Executed quantity.
    pub quantity: f64,
    /// Inferred direction.
    pub side: TradeSide,
    /// Venue timestamp, epoch milliseconds as reported upstream.
    pub timestamp: i64,
}

impl TradeEvent {
    /// Create a trade event.
    #[must_use]
    pub const fn new(pair: Pair, price: f64, quantity: f64, side: TradeSide, timestamp: i64) -> Self {
        Self {
            pair,
            price,
            quantity,
            side,
            timestamp,
        }
    }
}

// =============================================================================
// Mark Stat
// =============================================================================

/// Mark-price statistic derived 1:1 from a [`TradeEvent`].
///
/// The funding rate is always zero: this venue does not report one, but
/// the field exists so venue-agnostic consumers see a uniform shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkStat {
    /// Routing key, identical to the source trade's.
    pub pair: Pair,
    /// Mark price (the trade's execution price).
    pub mark_price: f64,
    /// Funding rate; always `0.0` for this venue.
    pub funding: f64,
    /// Venue timestamp, identical to the source trade's.
    pub timestamp: i64,
}

impl MarkStat {
    /// Derive the mark stat for a trade.
    #[must_use]
    pub fn from_trade(trade: &TradeEvent) -> Self {
        Self {
            pair: trade.pair.clone(),
            mark_price: trade.price,
            funding: 0.0,
            timestamp: trade.timestamp,
        }
    }
}
