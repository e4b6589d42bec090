//! # BFT Telemetry
//!
//! Logging setup and metrics exposition for Tendermint BFT nodes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bft_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! // run the consensus service; scrape with bft_telemetry::gather_metrics()
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BFT_SERVICE_NAME` | `bft-node` | Service name in logs |
//! | `BFT_NODE_ID` | `0` | Validator label |
//! | `BFT_LOG_LEVEL` | `info` | Log level filter |
//! | `BFT_JSON_LOGS` | `false` | JSON log lines |
//! | `BFT_METRICS` | `true` | Gather Prometheus metrics |

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{content_type, gather_metrics};
pub use tracing_setup::init_tracing;

#[doc(hidden)]
pub use tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing: {0}")]
    TracerInit(String),

    #[error("Failed to encode Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and report whether metrics will be exposed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let installed = init_tracing(&config)?;
    if !installed {
        tracing::debug!("Tracing subscriber already installed, keeping it");
    }
    Ok(TelemetryGuard { config })
}

/// Held for the lifetime of the node.
pub struct TelemetryGuard {
    config: TelemetryConfig,
}

impl TelemetryGuard {
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Prometheus text, or `None` when metrics are disabled.
    pub fn metrics(&self) -> Result<Option<String>, TelemetryError> {
        if !self.config.metrics_enabled {
            return Ok(None);
        }
        gather_metrics().map(Some)
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.config.full_service_name(), "Shutting down telemetry");
    }
}

/// Structured consensus event with the node's standard fields.
///
/// ```rust,ignore
/// log_event!(info, "commit", height = 5, round = 0);
/// ```
#[macro_export]
macro_rules! log_event {
    ($level:ident, $event:expr $(, $($field:tt)*)?) => {
        $crate::tracing::$level!(
            target: "bft",
            event = $event,
            $($($field)*,)?
            "consensus event"
        )
    };
}

/// Span with the consensus view attached.
#[macro_export]
macro_rules! consensus_span {
    ($name:expr, $height:expr, $round:expr $(, $($field:tt)*)?) => {
        $crate::tracing::info_span!($name, height = $height, round = $round $(, $($field)*)?)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_respects_metrics_toggle() {
        let config = TelemetryConfig {
            console_output: false,
            metrics_enabled: false,
            ..TelemetryConfig::default()
        };
        let guard = init_telemetry(config).unwrap();
        assert!(guard.metrics().unwrap().is_none());
    }

    #[test]
    fn test_macros_expand() {
        log_event!(info, "commit", height = 5u64, round = 0i64);
        log_event!(debug, "stale");
        let span = consensus_span!("round", 5u64, 1i64, step = "prevote");
        let _entered = span.enter();
    }
}
