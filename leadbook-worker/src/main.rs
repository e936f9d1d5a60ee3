//! # Leadbook Worker
//!
//! Background process that delivers queued email (single sends, newsletter
//! chunks, password resets) through each owner's transport, retries
//! transient failures and prunes expired credentials.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p leadbook-worker
//! ```

use leadbook_shared::{
    crypto::SecretBox,
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
};
use leadbook_worker::{
    config::WorkerConfig,
    mailers::SettingsResolver,
    orchestrator::{OrchestratorConfig, WorkerOrchestrator},
    queue::SendQueue,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadbook_worker=debug,leadbook_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Leadbook Worker v{} starting", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let pool = create_pool(DatabaseConfig::new(
        config.database_url.clone(),
        config.max_connections,
    ))
    .await?;

    run_migrations(&pool).await?;

    if config.system_mail.is_none() {
        tracing::warn!("System mailer not configured; password reset emails will fail");
    }

    let secrets = SecretBox::from_hex_key(&config.settings_encryption_key)?;
    let resolver = SettingsResolver::new(pool.clone(), secrets, config.system_mail.as_ref())?;

    let queue = SendQueue::with_limits(
        pool.clone(),
        config.batch_size,
        config.max_attempts,
        config.lease_secs,
    );

    let orchestrator = WorkerOrchestrator::with_config(
        pool,
        queue,
        Arc::new(resolver),
        OrchestratorConfig {
            poll_interval_secs: config.poll_interval_secs,
            max_concurrent: config.max_concurrent,
            prune_interval_secs: config.prune_interval_secs,
        },
    );

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    orchestrator.run().await
}
