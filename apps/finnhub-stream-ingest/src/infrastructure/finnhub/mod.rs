//! Finnhub WebSocket Adapter
//!
//! Implements the client side of Finnhub's trade stream:
//!
//! - **client**: the connection-owning ingest loop
//! - **codec**: JSON frame classification and control-frame encoding
//! - **messages**: wire-level frame and control types
//! - **status**: shared lifecycle and counter surface for health reporting
//! - **watchdog**: read-deadline detection for silently dead connections

pub mod client;
pub mod codec;
pub mod messages;
pub mod status;
pub mod watchdog;

pub use client::{
    CommandError, IngestClient, IngestClientConfig, IngestClientError, IngestCommand, IngestHandle,
};
pub use codec::{CodecError, FrameCodec};
pub use messages::{ControlMessage, Frame, RawTrade};
pub use status::{IngestState, IngestStatus, SharedIngestStatus};
pub use watchdog::{ActivityMonitor, Watchdog, WatchdogConfig, WatchdogEvent};
