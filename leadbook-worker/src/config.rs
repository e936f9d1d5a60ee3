/// Worker configuration
///
/// Loaded from environment variables (a `.env` file is honored).
///
/// # Environment Variables
///
/// ## Required
/// - `DATABASE_URL`: PostgreSQL connection string
/// - `SETTINGS_ENCRYPTION_KEY`: 64 hex chars, same key as the API
///
/// ## Optional
/// - `DB_MAX_CONNECTIONS` (default 5)
/// - `WORKER_POLL_INTERVAL_SECS` (default 2)
/// - `WORKER_BATCH_SIZE` (default 20)
/// - `WORKER_MAX_CONCURRENT` (default 4)
/// - `WORKER_MAX_ATTEMPTS` (default 3)
/// - `WORKER_LEASE_SECS` (default 300)
/// - `WORKER_PRUNE_INTERVAL_SECS` (default 3600)
/// - `SYSTEM_SMTP_HOST`, `SYSTEM_SMTP_PORT`, `SYSTEM_SMTP_USERNAME`,
///   `SYSTEM_SMTP_PASSWORD`, `SYSTEM_SMTP_SECURE`: transport for platform
///   mail such as password resets
/// - `SYSTEM_FROM_EMAIL`, `SYSTEM_FROM_NAME` (default `Leadbook`)
///
/// Without `SYSTEM_SMTP_HOST` and `SYSTEM_FROM_EMAIL`, owner-less sends fail.

use anyhow::{bail, Context};
use leadbook_shared::email::{compose::Sender, transport::TransportConfig};
use std::env;
use std::str::FromStr;

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub settings_encryption_key: String,
    pub poll_interval_secs: u64,
    pub batch_size: i64,
    pub max_concurrent: usize,
    pub max_attempts: i32,
    pub lease_secs: i64,
    pub prune_interval_secs: u64,
    pub system_mail: Option<SystemMailConfig>,
}

/// Platform transport and sender
#[derive(Debug, Clone)]
pub struct SystemMailConfig {
    pub transport: TransportConfig,
    pub sender: Sender,
}

fn parsed<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        _ => Ok(default),
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl WorkerConfig {
    /// Loads configuration from the environment
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing or a value does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let settings_encryption_key =
            env::var("SETTINGS_ENCRYPTION_KEY").context("SETTINGS_ENCRYPTION_KEY is required")?;
        if settings_encryption_key.trim().len() != 64 {
            bail!("SETTINGS_ENCRYPTION_KEY must be 64 hex characters");
        }

        let config = Self {
            database_url,
            max_connections: parsed("DB_MAX_CONNECTIONS", 5)?,
            settings_encryption_key: settings_encryption_key.trim().to_string(),
            poll_interval_secs: parsed("WORKER_POLL_INTERVAL_SECS", 2)?,
            batch_size: parsed("WORKER_BATCH_SIZE", 20)?,
            max_concurrent: parsed("WORKER_MAX_CONCURRENT", 4)?,
            max_attempts: parsed("WORKER_MAX_ATTEMPTS", 3)?,
            lease_secs: parsed("WORKER_LEASE_SECS", 300)?,
            prune_interval_secs: parsed("WORKER_PRUNE_INTERVAL_SECS", 3600)?,
            system_mail: SystemMailConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size < 1 {
            bail!("WORKER_BATCH_SIZE must be at least 1");
        }
        if self.max_concurrent < 1 {
            bail!("WORKER_MAX_CONCURRENT must be at least 1");
        }
        if self.max_attempts < 1 {
            bail!("WORKER_MAX_ATTEMPTS must be at least 1");
        }
        if self.lease_secs < 1 {
            bail!("WORKER_LEASE_SECS must be at least 1");
        }
        Ok(())
    }
}

impl SystemMailConfig {
    fn from_env() -> anyhow::Result<Option<Self>> {
        let (Some(host), Some(from_email)) = (optional("SYSTEM_SMTP_HOST"), optional("SYSTEM_FROM_EMAIL")) else {
            return Ok(None);
        };

        let port = match optional("SYSTEM_SMTP_PORT") {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .map_err(|e| anyhow::anyhow!("SYSTEM_SMTP_PORT is invalid: {}", e))?,
            ),
            None => None,
        };

        Ok(Some(Self {
            transport: TransportConfig {
                host,
                port,
                username: optional("SYSTEM_SMTP_USERNAME"),
                password: optional("SYSTEM_SMTP_PASSWORD"),
                secure: parsed("SYSTEM_SMTP_SECURE", false)?,
            },
            sender: Sender {
                name: Some(optional("SYSTEM_FROM_NAME").unwrap_or_else(|| "Leadbook".to_string())),
                email: from_email,
                reply_to: None,
            },
        }))
    }
}
