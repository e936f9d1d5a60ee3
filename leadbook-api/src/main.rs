//! # Leadbook API Server
//!
//! HTTP API for Leadbook: accounts and sessions, clients and leads,
//! geocoding and map points, booking PDFs, email templates and sends,
//! owner settings and license administration.
//!
//! Email delivery happens in `leadbook-worker`; this process only queues.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p leadbook-api
//! ```

use leadbook_api::{
    app::{build_router, AppState},
    config::Config,
};
use leadbook_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    redis::{RedisClient, RedisConfig},
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadbook_api=debug,leadbook_shared=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Leadbook API v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig::new(
        config.database.url.clone(),
        config.database.max_connections,
    ))
    .await?;

    run_migrations(&pool).await?;

    let redis = RedisClient::new(RedisConfig::new(config.redis.url.clone())).await?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool, redis, config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
