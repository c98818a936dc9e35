//! Configuration Module
//!
//! Configuration loading for the ingest service.

mod settings;

pub use settings::{
    ApiToken, ConfigError, IngestConfig, QueueSettings, ServerSettings, StreamSettings,
};
