//! Read-Deadline Watchdog
//!
//! Detects a silently-stalled connection. The upstream never guarantees
//! trade traffic, but it does ping periodically, so a socket that has
//! produced nothing at all for longer than the configured deadline is
//! considered dead and the ingest loop closes instead of blocking on a
//! read forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for the read deadline.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How long the connection may stay silent before it is declared
    /// stalled. Zero disables the watchdog entirely.
    pub idle_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl WatchdogConfig {
    /// Create a configuration with a custom deadline.
    #[must_use]
    pub const fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Whether the watchdog is turned off.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.idle_timeout.is_zero()
    }
}

/// Events emitted by the watchdog.
#[derive(Debug, Clone)]
pub enum WatchdogEvent {
    /// The connection has been silent past the deadline.
    Stalled {
        /// How long the connection had been idle when detected.
        idle_for: Duration,
    },
}

/// Last-inbound-activity record shared between the reader and the watchdog.
///
/// The ingest loop touches it on every inbound frame, protocol pings
/// included; the watchdog only reads.
#[derive(Debug)]
pub struct ActivityMonitor {
    last_activity: RwLock<Instant>,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    /// Create a monitor; the clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Record inbound activity.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// How long the connection has been silent.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Watchdog task that fires when the connection stalls.
///
/// # Example
///
/// ```rust,no_run
/// use finnhub_stream_ingest::infrastructure::finnhub::watchdog::{
///     ActivityMonitor, Watchdog, WatchdogConfig, WatchdogEvent,
/// };
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let config = WatchdogConfig::default();
///     let monitor = Arc::new(ActivityMonitor::new());
///     let (event_tx, mut event_rx) = mpsc::channel(1);
///     let cancel = CancellationToken::new();
///
///     tokio::spawn(Watchdog::new(config, monitor.clone(), event_tx, cancel.clone()).run());
///
///     // Reader side: monitor.record_activity() per inbound frame.
///     if let Some(WatchdogEvent::Stalled { idle_for }) = event_rx.recv().await {
///         // Close the connection.
///         let _ = idle_for;
///     }
/// }
/// ```
pub struct Watchdog {
    config: WatchdogConfig,
    monitor: Arc<ActivityMonitor>,
    event_tx: mpsc::Sender<WatchdogEvent>,
    cancel: CancellationToken,
}

impl Watchdog {
    /// Create a watchdog.
    #[must_use]
    pub const fn new(
        config: WatchdogConfig,
        monitor: Arc<ActivityMonitor>,
        event_tx: mpsc::Sender<WatchdogEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            monitor,
            event_tx,
            cancel,
        }
    }

    /// Run the deadline check loop until cancelled or a stall is reported.
    pub async fn run(self) {
        if self.config.is_disabled() {
            tracing::debug!("Read-deadline watchdog disabled");
            return;
        }

        // Check a few times per deadline window so detection lag stays
        // well under the timeout itself.
        let period = (self.config.idle_timeout / 4).max(Duration::from_millis(10));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Watchdog cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Compare idle time against the deadline.
    ///
    /// Returns `Err(())` once a stall has been reported and the loop
    /// should exit.
    async fn check(&self) -> Result<(), ()> {
        let idle_for = self.monitor.idle_for();
        if idle_for > self.config.idle_timeout {
            tracing::warn!(
                idle_secs = idle_for.as_secs(),
                deadline_secs = self.config.idle_timeout.as_secs(),
                "Connection stalled past read deadline"
            );
            let _ = self.event_tx.send(WatchdogEvent::Stalled { idle_for }).await;
            return Err(());
        }

        if self.event_tx.is_closed() {
            tracing::debug!("Event channel closed, stopping watchdog");
            return Err(());
        }

        Ok(())
    }
}
