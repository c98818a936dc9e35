//! Ingest Configuration Settings
//!
//! Configuration types for the ingest service, loaded from environment
//! variables. Everything has a default except the API token.

use std::fmt;
use std::time::Duration;

/// Environment variable holding the Finnhub API token.
const TOKEN_VAR: &str = "FINNHUB_API_TOKEN";

/// Finnhub API credential.
///
/// Redacts itself in both `Debug` and `Display`; the raw secret is only
/// reachable through [`ApiToken::reveal`], called at the single point the
/// dial URL is assembled.
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a raw token, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyValue`] if nothing remains after
    /// trimming.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let token = raw.into().trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::EmptyValue(TOKEN_VAR.to_string()));
        }
        Ok(Self(token))
    }

    /// Read the token from `FINNHUB_API_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when the variable is unset
    /// and [`ConfigError::EmptyValue`] when it is blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var(TOKEN_VAR)
            .map_err(|_| ConfigError::MissingEnvVar(TOKEN_VAR.to_string()))?;
        Self::new(raw)
    }

    /// The secret itself.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiToken").field(&"[REDACTED]").finish()
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Base WebSocket URL; the token is appended at dial time.
    pub ws_url: String,
    /// How long the connection may stay silent before it is declared
    /// stalled. Zero disables the read deadline.
    pub read_deadline: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.finnhub.io".to_string(),
            read_deadline: Duration::from_secs(60),
        }
    }
}

/// Channel sizing settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Capacity of each per-symbol sink mailbox.
    pub sink_queue_capacity: usize,
    /// Recent trades retained per sink.
    pub sink_window_size: usize,
    /// Capacity of the shared trade feed.
    pub trade_feed_capacity: usize,
    /// Capacity of the symbol-switch command channel.
    pub command_queue_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            sink_queue_capacity: 256,
            sink_window_size: 100,
            trade_feed_capacity: 10_000,
            command_queue_capacity: 32,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// API credential.
    pub token: ApiToken,
    /// Symbols to subscribe at startup and register sinks for. May be
    /// empty; everything then flows to the shared feed only.
    pub symbols: Vec<String>,
    /// Upstream connection settings.
    pub stream: StreamSettings,
    /// Channel sizing settings.
    pub queues: QueueSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API token is missing or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = ApiToken::from_env()?;

        let symbols = std::env::var("FINNHUB_SYMBOLS")
            .map(|raw| parse_symbol_list(&raw))
            .unwrap_or_default();

        let stream = StreamSettings {
            ws_url: std::env::var("FINNHUB_WS_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| StreamSettings::default().ws_url),
            read_deadline: parse_env_duration_secs(
                "READ_DEADLINE_SECS",
                StreamSettings::default().read_deadline,
            ),
        };

        let queues = QueueSettings {
            sink_queue_capacity: parse_env_usize(
                "SINK_QUEUE_CAPACITY",
                QueueSettings::default().sink_queue_capacity,
            ),
            sink_window_size: parse_env_usize(
                "SINK_WINDOW_SIZE",
                QueueSettings::default().sink_window_size,
            ),
            trade_feed_capacity: parse_env_usize(
                "TRADE_QUEUE_CAPACITY",
                QueueSettings::default().trade_feed_capacity,
            ),
            command_queue_capacity: parse_env_usize(
                "COMMAND_QUEUE_CAPACITY",
                QueueSettings::default().command_queue_capacity,
            ),
        };

        let server = ServerSettings {
            health_port: parse_env_u16("HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            token,
            symbols,
            stream,
            queues,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Split a comma list into venue-format symbols, dropping blanks and
/// duplicates while preserving first-seen order. Case is kept as given;
/// the venue matches subscription symbols case-sensitively.
fn parse_symbol_list(raw: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    for entry in raw.split(',') {
        let symbol = entry.trim().to_string();
        if symbol.is_empty() || symbols.contains(&symbol) {
            continue;
        }
        symbols.push(symbol);
    }
    symbols
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
