//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics exposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Validator label, usually a short address
    pub node_id: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to write logs to stdout at all
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether metrics are gathered for exposition
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "bft-node".to_string(),
            node_id: "0".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BFT_SERVICE_NAME`: Service name (default: bft-node)
    /// - `BFT_NODE_ID`: Validator label (default: 0)
    /// - `BFT_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `BFT_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `BFT_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `BFT_METRICS`: Enable metrics gathering (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("BFT_SERVICE_NAME").unwrap_or_else(|_| "bft-node".to_string()),

            node_id: env::var("BFT_NODE_ID").unwrap_or_else(|_| "0".to_string()),

            log_level: env::var("BFT_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("BFT_CONSOLE_OUTPUT")
                .map(|v| flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("BFT_JSON_LOGS")
                .map(|v| flag(&v, false))
                .unwrap_or(is_container),

            metrics_enabled: env::var("BFT_METRICS")
                .map(|v| flag(&v, true))
                .unwrap_or(true),
        }
    }

    /// Configuration for one validator of a local network.
    pub fn for_node(node_id: &str) -> Self {
        let mut config = Self::from_env();
        config.node_id = node_id.to_string();
        config
    }

    /// Service name including the node label.
    pub fn full_service_name(&self) -> String {
        format!("{}-{}", self.service_name, self.node_id)
    }
}

fn flag(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}
