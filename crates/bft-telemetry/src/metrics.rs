//! Prometheus exposition.
//!
//! The consensus crate registers its metrics in the prometheus default
//! registry; this module only encodes what is there.

use prometheus::{Encoder, TextEncoder};

use crate::TelemetryError;

/// Encode every registered metric in Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Content type to serve [`gather_metrics`] output under.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
