//! Finnhub WebSocket Message Types
//!
//! Wire format types for the Finnhub trade stream. Every frame is one JSON
//! object with a `type` discriminator; trades arrive batched under `data`.
//!
//! # Message Types
//!
//! ## Inbound
//! - `trade`: batch of raw trade records
//! - `ping`: application-level keep-alive, expects a `pong` reply
//! - anything else is surfaced as [`Frame::Unknown`]
//!
//! ## Outbound
//! - `subscribe` / `unsubscribe`: symbol subscription control
//! - `pong`: keep-alive reply
//!
//! # References
//!
//! - [Trades Websocket](https://finnhub.io/docs/api/websocket-trades)

use serde::{Deserialize, Serialize};

use crate::domain::normalize::RawTradeRecord;

// =============================================================================
// Inbound Messages
// =============================================================================

/// One raw trade record as it appears on the wire.
///
/// All value fields are optional: Finnhub occasionally omits them, and a
/// record missing its price or quantity must be skippable without
/// poisoning the rest of the batch.
///
/// # Wire Format (JSON)
/// ```json
/// {"s": "BINANCE:BTCUSDT", "p": 7296.89, "v": 0.011467, "t": 1575526691134}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    /// Venue symbol, casing as sent upstream.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Last price.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    /// Volume traded.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// Trade timestamp, UNIX milliseconds (0 when omitted).
    #[serde(rename = "t", default)]
    pub timestamp: i64,
}

impl From<RawTrade> for RawTradeRecord {
    fn from(raw: RawTrade) -> Self {
        Self {
            symbol: raw.symbol,
            price: raw.price,
            quantity: raw.volume,
            timestamp: raw.timestamp,
        }
    }
}

/// Trade batch frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "trade", "data": [{"s": "BINANCE:BTCUSDT", "p": 7296.89, "v": 0.011467, "t": 1575526691134}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeBatchMessage {
    /// Message type (always "trade").
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Raw trade records, in venue order. A missing `data` field decodes
    /// as an empty batch.
    #[serde(default)]
    pub data: Vec<RawTrade>,
}

/// One decoded inbound frame.
///
/// The discriminated result of [`FrameCodec::decode`]; the ingest loop
/// matches on it exhaustively.
///
/// [`FrameCodec::decode`]: crate::infrastructure::finnhub::FrameCodec::decode
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Batch of raw trade records, in venue order.
    TradeBatch(Vec<RawTrade>),
    /// Application-level keep-alive; the loop replies with a pong.
    KeepAlive,
    /// Unrecognized frame; carries the `type` tag (empty when absent).
    Unknown(String),
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Outbound control frame.
///
/// Serializes to the wire's `{"type": ..., "symbol": ...?}` shape.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribe", "symbol": "BINANCE:BTCUSDT"}
/// {"type": "unsubscribe", "symbol": "BINANCE:BTCUSDT"}
/// {"type": "pong"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Subscribe to a symbol's trade stream.
    Subscribe {
        /// Symbol to subscribe to.
        symbol: String,
    },
    /// Unsubscribe from a symbol's trade stream.
    Unsubscribe {
        /// Symbol to unsubscribe from.
        symbol: String,
    },
    /// Keep-alive reply to an inbound ping.
    Pong,
}

impl ControlMessage {
    /// Build a subscribe frame.
    #[must_use]
    pub fn subscribe(symbol: impl Into<String>) -> Self {
        Self::Subscribe {
            symbol: symbol.into(),
        }
    }

    /// Build an unsubscribe frame.
    #[must_use]
    pub fn unsubscribe(symbol: impl Into<String>) -> Self {
        Self::Unsubscribe {
            symbol: symbol.into(),
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Pong => "pong",
        }
    }
}
