//! Digital Key Service - Main Application Entry Point
//!
//! REST API server that manages the lifecycle of digital hotel room keys and
//! verifies keys presented at NFC door locks.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: Bearer tokens with SHA-256 hashing
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

use std::{sync::Arc, time::Duration};

use tracing_subscriber::EnvFilter;

use virtual_key_server::{
    config::Config,
    db,
    services::{delivery::HttpTransport, pass::PassIssuer},
    state::AppState,
    store::PgKeyStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let passes = PassIssuer::new(config.pass_base_url.clone(), config.signing_secret());

    if config.delivery_api_url.is_none() {
        tracing::warn!("DELIVERY_API_URL not set, email and SMS will not be sent");
    }
    let transport = HttpTransport::new(
        config.delivery_api_url.clone(),
        config.delivery_api_key.clone(),
        Duration::from_secs(config.delivery_timeout_secs),
    )?;

    let addr = format!("0.0.0.0:{}", config.server_port);

    let state = AppState {
        store: PgKeyStore::new(pool),
        transport,
        passes,
        config: Arc::new(config),
    };
    let app = virtual_key_server::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
