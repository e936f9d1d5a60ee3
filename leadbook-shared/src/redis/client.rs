/// Redis client wrapper with automatic reconnection and health checks
///
/// Leadbook uses Redis only for rate-limit buckets, so the client is a thin
/// wrapper over `redis::aio::ConnectionManager` with timeouts applied.
///
/// # Example
///
/// ```no_run
/// use leadbook_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisConfig::from_env()?;
/// let client = RedisClient::new(config).await?;
///
/// let healthy = client.ping().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```

use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Redis client errors
#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis health check failed: {0}")]
    HealthCheckFailed(String),

    /// Command did not finish within the configured timeout
    #[error("Redis command timed out")]
    Timeout,
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Format: redis://[username:password@]host:port[/db]
    pub url: String,

    pub connection_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    /// Creates a configuration with default timeouts
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout_secs: 5,
            command_timeout_secs: 2,
        }
    }

    /// Loads the configuration from the environment
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (required)
    /// - `REDIS_CONNECTION_TIMEOUT_SECS`: Connection timeout (default: 5)
    /// - `REDIS_COMMAND_TIMEOUT_SECS`: Command timeout (default: 2)
    pub fn from_env() -> Result<Self, RedisClientError> {
        dotenvy::dotenv().ok();

        let url = env::var("REDIS_URL").map_err(|_| {
            RedisClientError::ConfigError("REDIS_URL environment variable is required".to_string())
        })?;

        let defaults = Self::new(url);

        Ok(Self {
            connection_timeout_secs: env::var("REDIS_CONNECTION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.connection_timeout_secs),
            command_timeout_secs: env::var("REDIS_COMMAND_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.command_timeout_secs),
            ..defaults
        })
    }
}

/// Shared Redis handle; cloning is cheap
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Fails when the URL is invalid or the first connection cannot be made
    /// within the connection timeout.
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| RedisClientError::ConnectionError("connection timed out".to_string()))?
        .map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(url = %sanitize_url(&config.url), "Redis client connected");

        Ok(Self {
            manager,
            config: Arc::new(config),
        })
    }

    /// Sends PING; true on PONG
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();

        let reply: String = self
            .with_timeout(redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|e| RedisClientError::HealthCheckFailed(e.to_string()))?;

        Ok(reply == "PONG")
    }

    /// Connection handle for issuing commands
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Runs a Redis future under the command timeout
    pub async fn with_timeout<T, F>(&self, fut: F) -> Result<T, RedisClientError>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        tokio::time::timeout(Duration::from_secs(self.config.command_timeout_secs), fut)
            .await
            .map_err(|_| RedisClientError::Timeout)?
            .map_err(RedisClientError::from)
    }
}

/// Masks credentials in a Redis URL
fn sanitize_url(url: &str) -> String {
    if let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > scheme_end {
            return format!("{}***@{}", &url[..scheme_end + 3], &url[at_pos + 1..]);
        }
    }
    url.to_string()
}
