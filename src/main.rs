use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tourbook_api::config::config;
use tourbook_api::is_production;
use tourbook_api::routes::{self, AppState, Stores};

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    tracing::info!("Starting tourbook API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set");
    }
    if is_production!() && config.security.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
        anyhow::bail!("JWT_SECRET must be at least {} characters in production", MIN_PRODUCTION_SECRET_LEN);
    }

    let stores = Stores::from_config(config)
        .await
        .context("failed to initialise record stores")?;
    let app = routes::with_http_layers(routes::app(AppState::new(stores, config)), config);

    let bind_addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
