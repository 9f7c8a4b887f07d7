//! Shared application state: one `Arc` clone per request handler rather
//! than a lock around the whole engine, since `PipelineOrchestrator` is
//! already internally synchronized per session (§5 `SessionLockRegistry`).

use align_agent::AlignmentEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AlignmentEngine>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(engine: AlignmentEngine, metrics_handle: PrometheusHandle) -> Self {
        Self { engine: Arc::new(engine), metrics_handle }
    }
}
