//! Trade Normalization
//!
//! Converts raw exchange trade records into canonical [`TradeEvent`]s and
//! derived [`MarkStat`]s, inferring the trade direction from the last
//! observed price per symbol.
//!
//! # Design
//!
//! The normalizer owns the last-price table for one connection session.
//! It is held exclusively by the ingest loop's sequential task, which is
//! the invariant that makes direction inference race-free without any
//! locking: records are normalized strictly in arrival order, and each
//! record's direction depends on the price of the record before it.
//!
//! The normalizer is pure: it never logs and never touches I/O. Invalid
//! records come back as a typed [`RecordDefect`] so the caller can log and
//! count them.

use std::collections::HashMap;
use std::fmt;

use crate::domain::event::{MarkStat, Pair, TradeEvent, TradeSide};

// =============================================================================
// Input Records
// =============================================================================

/// One raw trade record as extracted from an inbound batch.
///
/// Every field the venue might omit is optional; validation happens in
/// [`TradeNormalizer::normalize`], not at decode time, so one incomplete
/// record never poisons the rest of its batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTradeRecord {
    /// Venue symbol, casing as sent upstream.
    pub symbol: Option<String>,
    /// Execution price.
    pub price: Option<f64>,
    /// Executed quantity.
    pub quantity: Option<f64>,
    /// Venue timestamp, epoch milliseconds (0 when omitted upstream).
    pub timestamp: i64,
}

/// Why a record was skipped instead of normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDefect {
    /// The record carried no symbol; it cannot be routed.
    MissingSymbol,
    /// The record carried no price; direction inference is impossible.
    MissingPrice,
    /// The record carried no quantity.
    MissingQuantity,
}

impl RecordDefect {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingSymbol => "missing_symbol",
            Self::MissingPrice => "missing_price",
            Self::MissingQuantity => "missing_quantity",
        }
    }
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized trade and its 1:1 derived mark stat.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTrade {
    /// The canonical trade.
    pub trade: TradeEvent,
    /// Mark-price stat derived from the trade.
    pub stat: MarkStat,
}

// =============================================================================
// Normalizer
// =============================================================================

/// Normalizes raw trade records, tracking last price per symbol.
///
/// Direction is a simplified uptick rule: a trade priced at or above the
/// previous trade for the same symbol (or with no prior trade at all) is a
/// buy; anything below is a sell. The venue does not report a taker side.
#[derive(Debug)]
pub struct TradeNormalizer {
    /// Venue identifier stamped onto every emitted pair.
    exchange: String,
    /// Symbol → most recently seen price, one connection session's worth.
    last_prices: HashMap<String, f64>,
}

impl TradeNormalizer {
    /// Create a normalizer with an empty last-price table.
    #[must_use]
    pub fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_lowercase(),
            last_prices: HashMap::new(),
        }
    }

    /// Normalize one record.
    ///
    /// Returns the canonical trade + stat, or the defect that made the
    /// record unusable. A defective record never updates the last-price
    /// table.
    ///
    /// # Errors
    ///
    /// [`RecordDefect`] when the record is missing its symbol, price, or
    /// quantity.
    pub fn normalize(&mut self, record: &RawTradeRecord) -> Result<NormalizedTrade, RecordDefect> {
        let symbol = record
            .symbol
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(RecordDefect::MissingSymbol)?;
        let price = record.price.ok_or(RecordDefect::MissingPrice)?;
        let quantity = record.quantity.ok_or(RecordDefect::MissingQuantity)?;

        let symbol = symbol.to_lowercase();

        // Inclusive tie goes to buy; so does the first trade of a symbol.
        let side = match self.last_prices.get(&symbol) {
            Some(last) if price < *last => TradeSide::Sell,
            _ => TradeSide::Buy,
        };
        self.last_prices.insert(symbol.clone(), price);

        let trade = TradeEvent::new(
            Pair::new(&self.exchange, &symbol),
            price,
            quantity,
            side,
            record.timestamp,
        );
        let stat = MarkStat::from_trade(&trade);

        Ok(NormalizedTrade { trade, stat })
    }

    /// Last observed price for a symbol (canonical lower-case), if any.
    #[must_use]
    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_prices.get(symbol).copied()
    }

    /// Number of symbols with a recorded last price.
    #[must_use]
    pub fn tracked_symbols(&self) -> usize {
        self.last_prices.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn record(symbol: &str, price: f64, qty: f64, ts: i64) -> RawTradeRecord {
        RawTradeRecord {
            symbol: Some(symbol.to_string()),
            price: Some(price),
            quantity: Some(qty),
            timestamp: ts,
        }
    }

    #[test]
    fn first_trade_of_symbol_is_buy() {
        let mut normalizer = TradeNormalizer::new("finnhub");
        let out = normalizer.normalize(&record("btcusdt", 100.0, 1.0, 1000)).unwrap();
        assert_eq!(out.trade.side, TradeSide::Buy);
    }

    #[test]
    fn price_sequence_yields_expected_directions() {
        // 10 (no prior), 9 (down), 9 (tie), 11 (up).
        let mut normalizer = TradeNormalizer::new("finnhub");
        let sides: Vec<TradeSide> = [10.0, 9.0, 9.0, 11.0]
            .iter()
            .map(|p| {
                normalizer
                    .normalize(&record("btcusdt", *p, 1.0, 0))
                    .unwrap()
                    .trade
                    .side
            })
            .collect();

        assert_eq!(
            sides,
            vec![TradeSide::Buy, TradeSide::Sell, TradeSide::Buy, TradeSide::Buy]
        );
    }

    #[test]
    fn symbols_track_prices_independently() {
        let mut normalizer = TradeNormalizer::new("finnhub");
        normalizer.normalize(&record("btcusdt", 100.0, 1.0, 0)).unwrap();
        normalizer.normalize(&record("ethusdt", 50.0, 1.0, 0)).unwrap();

        // btcusdt's reference price is 100, not ethusdt's 50.
        let out = normalizer.normalize(&record("btcusdt", 60.0, 1.0, 0)).unwrap();
        assert_eq!(out.trade.side, TradeSide::Sell);
    }

    #[test]
    fn symbol_is_canonicalized_to_lowercase() {
        let mut normalizer = TradeNormalizer::new("finnhub");
        normalizer.normalize(&record("BTCUSDT", 100.0, 1.0, 0)).unwrap();

        assert_eq!(normalizer.last_price("btcusdt"), Some(100.0));
        assert_eq!(normalizer.last_price("BTCUSDT"), None);

        // A later lower-case record sees the earlier upper-case price.
        let out = normalizer.normalize(&record("btcusdt", 90.0, 1.0, 0)).unwrap();
        assert_eq!(out.trade.side, TradeSide::Sell);
    }

    #[test_case(RawTradeRecord { symbol: None, price: Some(1.0), quantity: Some(1.0), timestamp: 0 }, RecordDefect::MissingSymbol; "no symbol")]
    #[test_case(RawTradeRecord { symbol: Some(String::new()), price: Some(1.0), quantity: Some(1.0), timestamp: 0 }, RecordDefect::MissingSymbol; "empty symbol")]
    #[test_case(RawTradeRecord { symbol: Some("btcusdt".into()), price: None, quantity: Some(1.0), timestamp: 0 }, RecordDefect::MissingPrice; "no price")]
    #[test_case(RawTradeRecord { symbol: Some("btcusdt".into()), price: Some(1.0), quantity: None, timestamp: 0 }, RecordDefect::MissingQuantity; "no quantity")]
    fn defective_records_are_rejected(record: RawTradeRecord, expected: RecordDefect) {
        let mut normalizer = TradeNormalizer::new("finnhub");
        assert_eq!(normalizer.normalize(&record), Err(expected));
    }

    #[test]
    fn defective_record_never_updates_last_price() {
        let mut normalizer = TradeNormalizer::new("finnhub");
        normalizer.normalize(&record("btcusdt", 100.0, 1.0, 0)).unwrap();

        let missing_price = RawTradeRecord {
            symbol: Some("btcusdt".into()),
            price: None,
            quantity: Some(2.0),
            timestamp: 0,
        };
        assert!(normalizer.normalize(&missing_price).is_err());
        assert_eq!(normalizer.last_price("btcusdt"), Some(100.0));

        // Direction inference still uses the pre-defect reference price.
        let out = normalizer.normalize(&record("btcusdt", 99.0, 1.0, 0)).unwrap();
        assert_eq!(out.trade.side, TradeSide::Sell);
    }

    #[test]
    fn normalized_trade_carries_wire_values_and_derived_stat() {
        let mut normalizer = TradeNormalizer::new("finnhub");
        let out = normalizer
            .normalize(&record("ethusdt", 50.25, 3.5, 1_700_000_000_123))
            .unwrap();

        assert_eq!(out.trade.pair, Pair::new("finnhub", "ethusdt"));
        assert!((out.trade.price - 50.25).abs() < f64::EPSILON);
        assert!((out.trade.quantity - 3.5).abs() < f64::EPSILON);
        assert_eq!(out.trade.timestamp, 1_700_000_000_123);

        assert_eq!(out.stat.pair, out.trade.pair);
        assert!((out.stat.mark_price - 50.25).abs() < f64::EPSILON);
        assert!(out.stat.funding.abs() < f64::EPSILON);
        assert_eq!(out.stat.timestamp, out.trade.timestamp);
    }

    #[test]
    fn three_symbol_batch_matches_expected_directions_and_table() {
        let mut normalizer = TradeNormalizer::new("finnhub");
        let batch = [
            record("btcusdt", 100.0, 1.0, 1000),
            record("btcusdt", 95.0, 2.0, 1001),
            record("ethusdt", 50.0, 3.0, 1002),
        ];

        let sides: Vec<TradeSide> = batch
            .iter()
            .map(|r| normalizer.normalize(r).unwrap().trade.side)
            .collect();

        assert_eq!(sides, vec![TradeSide::Buy, TradeSide::Sell, TradeSide::Buy]);
        assert_eq!(normalizer.last_price("btcusdt"), Some(95.0));
        assert_eq!(normalizer.last_price("ethusdt"), Some(50.0));
        assert_eq!(normalizer.tracked_symbols(), 2);
    }

    proptest! {
        // Direction must equal the uptick rule against the previous price
        // for any sequence, with the first trade always a buy.
        #[test]
        fn direction_always_matches_uptick_rule(
            prices in proptest::collection::vec(0.01f64..10_000.0, 1..50)
        ) {
            let mut normalizer = TradeNormalizer::new("finnhub");
            let mut previous: Option<f64> = None;

            for price in prices {
                let out = normalizer
                    .normalize(&record("btcusdt", price, 1.0, 0))
                    .unwrap();
                let expected = previous.map_or(TradeSide::Buy, |last| {
                    if price >= last { TradeSide::Buy } else { TradeSide::Sell }
                });
                prop_assert_eq!(out.trade.side, expected);
                previous = Some(price);
            }
        }
    }
}
