//! Tracing subscriber setup
//!
//! Structured logs go to stdout as JSON by default, or as human-readable
//! lines when `LOG_FORMAT=text`. Verbosity follows `RUST_LOG`.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,lattice_connector=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Unknown `LOG_FORMAT` value
    #[error("unsupported log format: {0} (expected json or text)")]
    UnsupportedFormat(String),

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Output format of the fmt layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with the current span
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(TelemetryError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded on every log line
    pub service_name: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "lattice-connector".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// Build a config for `service_name`, reading `LOG_FORMAT` from the environment
    pub fn from_env(service_name: impl Into<String>) -> Result<Self, TelemetryError> {
        let format = match std::env::var("LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };
        Ok(Self {
            service_name: service_name.into(),
            format,
        })
    }
}

/// Install the global tracing subscriber
///
/// # Example
///
/// ```ignore
/// use lattice_connector::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(TelemetryConfig::from_env("lattice-connector")?)?;
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (json_layer, text_layer) = match config.format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        ),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })?;

    tracing::debug!(service = %config.service_name, format = ?config.format, "telemetry initialized");
    Ok(())
}
