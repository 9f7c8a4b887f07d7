//! Prometheus metrics exposition, via `metrics-exporter-prometheus`'s
//! own documented `PrometheusBuilder::install_recorder` usage.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder and returns a handle `/metrics` renders
/// from. Panics if a recorder is already installed, same as the
/// underlying crate's own `install_recorder`.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> String {
    state.metrics_handle.render()
}
