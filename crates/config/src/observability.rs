//! Ambient observability configuration (§1 "Structured logging &
//! tracing", §1 "Metrics"). The concrete exporter (OTLP endpoint,
//! Prometheus bind address) is left to the binary; this crate only
//! carries the settings needed to construct one.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    pub format: LogFormat,
    /// `tracing_subscriber::EnvFilter` directive string, e.g.
    /// `"align_pipeline=debug,info"`.
    pub filter: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { format: LogFormat::Pretty, filter: "info".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Bind address for the metrics facade's exporter (e.g. Prometheus
    /// text exposition); the exporter itself lives in the binary.
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, bind_address: "0.0.0.0:9464".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}
