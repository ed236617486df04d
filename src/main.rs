use machine_risk_engine::{
    api::{build_router, AppState},
    config::Config,
    ml::RiskScoringService,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before tracing so the log filter can come from it
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing; RUST_LOG overrides the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.default_filter().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting machine risk engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Model artifacts: {}", config.model.model_dir.display());

    // Restore persisted classifier state; a missing or corrupt artifact pair
    // just means starting on the rule-based path
    let engine = Arc::new(RiskScoringService::with_restored_state(config.model.clone()));
    let status = engine.status().await;
    if status.model_loaded {
        tracing::info!("✅ Trained classifier restored from artifacts");
    } else {
        tracing::info!("⚠️  No trained model, scoring falls back to rule-based heuristics");
    }

    // Build HTTP router; the request boundary owns timeout policy
    let app_state = AppState::new(engine);
    let app = build_router(app_state).layer(TimeoutLayer::new(Duration::from_secs(
        config.server.request_timeout_secs,
    )));

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Scoring: http://{}/v1/predict", http_addr);
    tracing::info!("   Training: http://{}/v1/train", http_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
