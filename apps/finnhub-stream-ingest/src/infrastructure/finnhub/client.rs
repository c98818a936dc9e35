//! Finnhub Ingest Client
//!
//! Owns the WebSocket connection to Finnhub's trade stream and drives the
//! whole ingest path: read a frame, decode it, normalize the records,
//! route the events. One sequential task does all of it, which is what
//! lets the normalizer keep its last-price table without locks.
//!
//! # Lifecycle
//!
//! `Connecting → Subscribing → Streaming → Closed`, strictly forward.
//! There is no reconnect: once the connection drops or stalls, the run
//! future resolves and the process supervisor decides what happens next.
//!
//! # Commands
//!
//! An [`IngestHandle`] feeds symbol-switch commands over a bounded mpsc
//! channel. The loop drains commands one at a time between frames, so
//! concurrent switch requests are serialized by construction.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::domain::normalize::{RawTradeRecord, TradeNormalizer};
use crate::domain::subscription::SubscriptionManager;
use crate::infrastructure::config::ApiToken;
use crate::infrastructure::metrics::{self, FrameKind, SwitchOutcome};
use crate::infrastructure::router::EventRouter;

use super::codec::FrameCodec;
use super::messages::{ControlMessage, Frame};
use super::status::{IngestState, SharedIngestStatus};
use super::watchdog::{ActivityMonitor, Watchdog, WatchdogConfig, WatchdogEvent};

/// Exchange identifier stamped onto every normalized pair.
const EXCHANGE: &str = "finnhub";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that end an ingest run.
///
/// Per-frame problems never surface here; they are logged and the loop
/// continues. Only a failed dial or a stalled connection is fatal.
#[derive(Debug, thiserror::Error)]
pub enum IngestClientError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// No inbound frames arrived within the read deadline.
    #[error("connection stalled: silent for {idle_for:?}")]
    Stalled {
        /// How long the connection had been idle when detected.
        idle_for: Duration,
    },
}

/// Error returned by [`IngestHandle`] when the loop is gone.
#[derive(Debug, thiserror::Error)]
#[error("ingest loop has stopped")]
pub struct CommandError;

// =============================================================================
// Commands
// =============================================================================

/// Commands accepted by a running ingest loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestCommand {
    /// Switch the active upstream subscription to this symbol.
    ChangeSymbol(String),
}

/// Cloneable handle for issuing commands to a running [`IngestClient`].
#[derive(Debug, Clone)]
pub struct IngestHandle {
    command_tx: mpsc::Sender<IngestCommand>,
}

impl IngestHandle {
    /// Ask the loop to switch the active symbol.
    ///
    /// Waits for mailbox room if the loop is busy; queued switches are
    /// applied in arrival order.
    ///
    /// # Errors
    ///
    /// [`CommandError`] if the ingest loop has stopped.
    pub async fn change_symbol(&self, symbol: impl Into<String>) -> Result<(), CommandError> {
        self.command_tx
            .send(IngestCommand::ChangeSymbol(symbol.into()))
            .await
            .map_err(|_| CommandError)
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the ingest client.
#[derive(Debug, Clone)]
pub struct IngestClientConfig {
    /// Base WebSocket URL. The token is appended as a query parameter at
    /// dial time only; this base form is what appears in logs.
    pub url: String,
    /// API credential.
    pub token: ApiToken,
    /// Symbols subscribed right after connecting. Startup subscriptions
    /// do not claim the active-symbol slot; only a committed switch does.
    pub startup_symbols: Vec<String>,
    /// Capacity of the command mailbox.
    pub command_queue_capacity: usize,
    /// Read-deadline settings.
    pub watchdog: WatchdogConfig,
}

impl IngestClientConfig {
    /// Create a configuration with default sizing.
    #[must_use]
    pub fn new(url: String, token: ApiToken) -> Self {
        Self {
            url,
            token,
            startup_symbols: Vec::new(),
            command_queue_capacity: 32,
            watchdog: WatchdogConfig::default(),
        }
    }

    /// Full dial URL including the credential. Never log this.
    fn dial_url(&self) -> String {
        format!("{}?token={}", self.url, self.token.reveal())
    }
}

// =============================================================================
// Ingest Client
// =============================================================================

/// WebSocket client for the Finnhub trade stream.
///
/// Owns the connection, the frame codec, the normalizer (and with it the
/// per-session last-price table), and the subscription state. Constructed
/// together with the [`IngestHandle`] that feeds it commands.
pub struct IngestClient {
    config: IngestClientConfig,
    codec: FrameCodec,
    normalizer: TradeNormalizer,
    subscription: SubscriptionManager,
    router: EventRouter,
    status: SharedIngestStatus,
    command_rx: mpsc::Receiver<IngestCommand>,
    cancel: CancellationToken,
}

impl IngestClient {
    /// Create a client and the command handle paired with it.
    #[must_use]
    pub fn new(
        config: IngestClientConfig,
        router: EventRouter,
        status: SharedIngestStatus,
        cancel: CancellationToken,
    ) -> (Self, IngestHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity.max(1));

        let client = Self {
            codec: FrameCodec::new(),
            normalizer: TradeNormalizer::new(EXCHANGE),
            subscription: SubscriptionManager::new(),
            config,
            router,
            status,
            command_rx,
            cancel,
        };

        (client, IngestHandle { command_tx })
    }

    /// Run the ingest loop to completion.
    ///
    /// Resolves `Ok(())` when the connection closes (server close frame,
    /// end of stream, or cancellation) and `Err` on a failed dial or a
    /// stalled connection. Either way the status surface reports `Closed`
    /// when this returns.
    ///
    /// # Errors
    ///
    /// [`IngestClientError::ConnectionFailed`] when the dial fails,
    /// [`IngestClientError::Stalled`] when the read deadline fires.
    pub async fn run(mut self) -> Result<(), IngestClientError> {
        self.transition(IngestState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to trade stream");

        let dial_url = self.config.dial_url();
        let (ws_stream, _response) = match tokio_tungstenite::connect_async(&dial_url).await {
            Ok(pair) => pair,
            Err(e) => {
                // The error text may embed the dial URL; scrub the
                // credential before it reaches a log or caller.
                let detail = redact_token(&e.to_string(), self.config.token.reveal());
                tracing::error!(url = %self.config.url, error = %detail, "Connection failed");
                self.status.set_error(detail.clone());
                self.transition(IngestState::Closed);
                return Err(IngestClientError::ConnectionFailed(detail));
            }
        };

        let (mut write, mut read) = ws_stream.split();

        self.transition(IngestState::Subscribing);
        for symbol in &self.config.startup_symbols {
            match self
                .send_control(&mut write, &ControlMessage::subscribe(symbol.as_str()))
                .await
            {
                Ok(()) => tracing::info!(symbol = %symbol, "Subscribed"),
                Err(detail) => {
                    tracing::warn!(symbol = %symbol, error = %detail, "Startup subscribe failed");
                }
            }
        }

        self.transition(IngestState::Streaming);

        // Read-deadline watchdog. The guard cancels it on every exit path.
        let monitor = Arc::new(ActivityMonitor::new());
        let (watchdog_tx, mut watchdog_rx) = mpsc::channel(1);
        let watchdog_cancel = CancellationToken::new();
        tokio::spawn(
            Watchdog::new(
                self.config.watchdog.clone(),
                Arc::clone(&monitor),
                watchdog_tx,
                watchdog_cancel.clone(),
            )
            .run(),
        );
        let _watchdog_guard = watchdog_cancel.drop_guard();

        let mut commands_open = true;
        let mut watchdog_open = true;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Ingest loop cancelled, closing connection");
                    let _ = write.send(Message::Close(None)).await;
                    self.transition(IngestState::Closed);
                    return Ok(());
                }
                command = self.command_rx.recv(), if commands_open => {
                    match command {
                        Some(IngestCommand::ChangeSymbol(symbol)) => {
                            self.handle_switch(&symbol, &mut write).await;
                        }
                        None => {
                            tracing::debug!("Command channel closed");
                            commands_open = false;
                        }
                    }
                }
                event = watchdog_rx.recv(), if watchdog_open => {
                    match event {
                        Some(WatchdogEvent::Stalled { idle_for }) => {
                            tracing::error!(
                                idle_secs = idle_for.as_secs(),
                                "Read deadline exceeded, closing connection"
                            );
                            self.status
                                .set_error(format!("connection stalled for {}s", idle_for.as_secs()));
                            self.transition(IngestState::Closed);
                            return Err(IngestClientError::Stalled { idle_for });
                        }
                        None => {
                            tracing::debug!("Watchdog channel closed");
                            watchdog_open = false;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            monitor.record_activity();
                            self.status.record_frame();
                            self.handle_frame(&text, &mut write).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            monitor.record_activity();
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                tracing::warn!(error = %e, "Failed to answer protocol ping");
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            monitor.record_activity();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server closed the connection");
                            self.transition(IngestState::Closed);
                            return Ok(());
                        }
                        Some(Ok(_)) => {
                            // Binary and raw frames are not part of this protocol.
                            monitor.record_activity();
                        }
                        Some(Err(e)) if is_close_error(&e) => {
                            tracing::info!(error = %e, "Connection closed");
                            self.transition(IngestState::Closed);
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket read error");
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            self.transition(IngestState::Closed);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Handle one inbound text frame.
    async fn handle_frame<W>(&mut self, text: &str, write: &mut W)
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        match self.codec.decode(text) {
            Ok(Frame::TradeBatch(records)) => {
                metrics::record_frame_received(FrameKind::Trade);
                for raw in records {
                    self.process_record(raw.into());
                }
            }
            Ok(Frame::KeepAlive) => {
                metrics::record_frame_received(FrameKind::Ping);
                tracing::debug!("Keep-alive ping received");
                match self.send_control(write, &ControlMessage::Pong).await {
                    Ok(()) => {
                        self.status.record_pong();
                        metrics::record_pong_sent();
                    }
                    Err(detail) => {
                        tracing::warn!(error = %detail, "Failed to send keep-alive pong");
                    }
                }
            }
            Ok(Frame::Unknown(tag)) => {
                metrics::record_frame_received(FrameKind::Unknown);
                tracing::warn!(tag = %tag, "Ignoring unknown frame type");
            }
            Err(e) => {
                metrics::record_decode_error();
                tracing::warn!(error = %e, "Failed to decode frame");
            }
        }
    }

    /// Normalize and route one raw record.
    fn process_record(&mut self, record: RawTradeRecord) {
        match self.normalizer.normalize(&record) {
            Ok(normalized) => {
                self.status.record_trade();
                metrics::record_trade_normalized(normalized.trade.side);
                let outcome = self.router.route(normalized.trade, normalized.stat);
                metrics::record_event_routed(outcome);
            }
            Err(defect) => {
                self.status.record_skip();
                metrics::record_skipped_record(defect.as_str());
                tracing::warn!(
                    reason = %defect,
                    symbol = record.symbol.as_deref().unwrap_or(""),
                    "Skipping trade record"
                );
            }
        }
    }

    /// Perform one symbol switch: unsubscribe the old symbol, subscribe
    /// the new one, commit only if the subscribe send succeeded.
    async fn handle_switch<W>(&mut self, new_symbol: &str, write: &mut W)
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let plan = self.subscription.plan_switch(new_symbol);
        tracing::info!(
            from = plan.unsubscribe.as_deref().unwrap_or("none"),
            to = %plan.subscribe,
            "Switching active symbol"
        );

        // Unsubscribe failure is logged and the switch proceeds; the
        // subscribe send below decides the outcome.
        if let Some(old) = &plan.unsubscribe {
            if let Err(detail) = self
                .send_control(write, &ControlMessage::unsubscribe(old.as_str()))
                .await
            {
                tracing::warn!(symbol = %old, error = %detail, "Unsubscribe failed");
            }
        }

        match self
            .send_control(write, &ControlMessage::subscribe(plan.subscribe.as_str()))
            .await
        {
            Ok(()) => {
                let symbol = plan.subscribe;
                self.subscription.commit(symbol.clone());
                self.status.set_active_symbol(symbol.clone());
                metrics::record_symbol_switch(SwitchOutcome::Committed);
                tracing::info!(symbol = %symbol, "Active symbol switched");
            }
            Err(detail) => {
                metrics::record_symbol_switch(SwitchOutcome::Aborted);
                tracing::warn!(
                    symbol = %plan.subscribe,
                    error = %detail,
                    "Subscribe failed, switch not committed"
                );
            }
        }
    }

    /// Encode and send one control frame. The `Err` carries the failure
    /// detail for the caller to log; none of these sends are fatal.
    async fn send_control<W>(&self, write: &mut W, message: &ControlMessage) -> Result<(), String>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = self
            .codec
            .encode(message)
            .map_err(|e| e.to_string())?;

        tracing::debug!(kind = message.kind(), "Sending control frame");

        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| e.to_string())
    }

    /// Advance the state machine and publish the new state.
    fn transition(&self, state: IngestState) {
        tracing::info!(state = %state, "Ingest state changed");
        self.status.set_state(state);
        metrics::set_ingest_state(state);
    }
}

fn is_close_error(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
    )
}

fn redact_token(message: &str, token: &str) -> String {
    message.replace(token, "[REDACTED]")
}

// =============================================================================
// Tests
// =============================================================================
