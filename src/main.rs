// Load configuration
// Set up logging
// Build shared state and start background jobs
// Serve the gateway until ctrl-c

use rpc_gateway_service::{api, config::Config, state::AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rpc-gateway-service");

    let config = Config::from_env();
    tracing::info!(
        "Configuration loaded: primary endpoint {}, cache enabled {}, scheduler {:?}",
        config.primary_endpoint,
        config.cache_enabled,
        config.scheduler_mode
    );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let app_state = Arc::new(AppState::from_config(config)?);
    app_state.start_background().await;

    let app = api::create_router(app_state.clone());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
        })
        .await?;

    app_state.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
