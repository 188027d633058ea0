//! Observability utilities.
//!
//! The engine logs through `tracing`; [`init_tracing`] installs a
//! `tracing-subscriber` formatter for binaries and tests that want output.

mod spans;

pub use spans::{step_span, SpanTimer};

use crate::errors::OpflowError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Sets the default filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> Result<EnvFilter, OpflowError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| OpflowError::Config(format!("invalid log level '{}': {e}", self.level))),
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the configured level.
///
/// # Errors
///
/// Returns a configuration error for an invalid level or when a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), OpflowError> {
    let filter = config.filter()?;
    let result = match config.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init(),
    };
    result.map_err(|e| OpflowError::Config(format!("unable to install tracing subscriber: {e}")))
}
