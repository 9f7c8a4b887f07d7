//! Demonstration HTTP surface over `PipelineOrchestrator`: a turn
//! submission route plus health/readiness/metrics. Websocket, WebRTC,
//! push-to-talk, auth, and MCP transports are out of scope here — this
//! is a plain request/response HTTP surface over one pipeline call.

pub mod error;
pub mod http;
pub mod metrics;
pub mod state;

pub use error::ApiError;
pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
