//! Demonstration server entry point: loads `Settings`, wires concrete
//! providers from environment variables, and serves the turn-submission
//! route end to end against a live `PipelineOrchestrator`.

use align_config::{LogFormat, Settings};
use align_llm::AnthropicProvider;
use align_rag::{HttpEmbeddingConfig, HttpEmbeddingProvider, HttpRerankConfig, HttpRerankProvider};
use align_server::{create_router, init_metrics, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("ALIGN_CONFIG_PATH").ok();
    let settings = Settings::load(config_path.as_deref().map(std::path::Path::new))
        .unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        });

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting align-server");
    tracing::info!(environment = ?settings.environment, "configuration loaded");

    let metrics_handle = init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    let llm = AnthropicProvider::new(anthropic_config_from_env())?;
    let embedder = HttpEmbeddingProvider::new(embedding_config_from_env())?;
    let reranker = HttpRerankProvider::new(rerank_config_from_env())?;

    let providers = align_agent::AlignmentEngineProviders {
        llm: Arc::new(llm),
        embedder: Arc::new(embedder),
        reranker: Arc::new(reranker),
    };

    let engine = align_agent::AlignmentEngine::bootstrap(settings, providers)?;
    let state = AppState::new(engine, metrics_handle);
    let app = create_router(state);

    let port: u16 = std::env::var("ALIGN_SERVER_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.observability.tracing.filter.clone().into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = match settings.observability.tracing.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };
    subscriber.with(fmt_layer).init();
}

fn anthropic_config_from_env() -> align_llm::AnthropicConfig {
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
    align_llm::AnthropicConfig::new(api_key)
}

fn embedding_config_from_env() -> HttpEmbeddingConfig {
    let endpoint = std::env::var("ALIGN_EMBEDDING_ENDPOINT").unwrap_or_else(|_| "http://localhost:8081".to_string());
    let dimensions = std::env::var("ALIGN_EMBEDDING_DIMENSIONS").ok().and_then(|d| d.parse().ok()).unwrap_or(1536);
    let default_model = std::env::var("ALIGN_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string());
    let config = HttpEmbeddingConfig::new(endpoint, default_model, dimensions);
    match std::env::var("ALIGN_EMBEDDING_API_KEY") {
        Ok(key) if !key.is_empty() => config.with_api_key(key),
        _ => config,
    }
}

fn rerank_config_from_env() -> HttpRerankConfig {
    let endpoint = std::env::var("ALIGN_RERANK_ENDPOINT").unwrap_or_else(|_| "http://localhost:8082".to_string());
    let default_model = std::env::var("ALIGN_RERANK_MODEL").unwrap_or_else(|_| "rerank-english-v3.0".to_string());
    let config = HttpRerankConfig::new(endpoint, default_model);
    match std::env::var("ALIGN_RERANK_API_KEY") {
        Ok(key) if !key.is_empty() => config.with_api_key(key),
        _ => config,
    }
}
