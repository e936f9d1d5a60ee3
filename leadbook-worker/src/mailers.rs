/// Mailer resolution
///
/// Each queued send is delivered through its owner's transport, built from
/// `app_settings` with the SMTP password decrypted. Sends without an owner
/// (password resets) use the platform's system mailer.
///
/// Resolution sits behind [`MailerResolver`] so tests can route every send
/// into a [`MemoryMailer`](leadbook_shared::email::transport::MemoryMailer).

use async_trait::async_trait;
use leadbook_shared::{
    crypto::{CryptoError, SecretBox},
    email::{
        compose::{transport_config, Sender},
        transport::{mailer_for, MailError, Mailer},
    },
    models::{app_settings::AppSettings, email_send::EmailSend},
};
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SystemMailConfig;

/// Why a send could not be matched to a transport
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored SMTP password could not be decrypted: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Mail(#[from] MailError),

    /// Owner has no from address
    #[error("Sender email is not configured")]
    NoSender,

    /// Owner-less send and no system transport
    #[error("System mailer is not configured")]
    NoSystemMailer,
}

impl ResolveError {
    /// Whether retrying could help
    pub fn is_permanent(&self) -> bool {
        match self {
            ResolveError::Database(_) => false,
            ResolveError::Mail(e) => e.is_permanent(),
            ResolveError::Crypto(_) | ResolveError::NoSender | ResolveError::NoSystemMailer => true,
        }
    }
}

/// Transport plus sender identity for one send
#[derive(Clone)]
pub struct ResolvedMailer {
    pub mailer: Arc<dyn Mailer>,
    pub sender: Sender,
}

/// Picks the transport for a send
#[async_trait]
pub trait MailerResolver: Send + Sync {
    async fn resolve(&self, send: &EmailSend) -> Result<ResolvedMailer, ResolveError>;
}

/// Resolver backed by owner settings and the system mailer
pub struct SettingsResolver {
    db: PgPool,
    secrets: SecretBox,
    system: Option<ResolvedMailer>,
}

impl SettingsResolver {
    /// # Errors
    ///
    /// Fails when the system transport configuration is unusable.
    pub fn new(
        db: PgPool,
        secrets: SecretBox,
        system: Option<&SystemMailConfig>,
    ) -> Result<Self, MailError> {
        let system = match system {
            Some(config) => Some(ResolvedMailer {
                mailer: Arc::from(mailer_for(&config.transport)?),
                sender: config.sender.clone(),
            }),
            None => None,
        };

        Ok(Self { db, secrets, system })
    }
}

#[async_trait]
impl MailerResolver for SettingsResolver {
    async fn resolve(&self, send: &EmailSend) -> Result<ResolvedMailer, ResolveError> {
        let Some(owner_id) = send.owner_id else {
            return self.system.clone().ok_or(ResolveError::NoSystemMailer);
        };

        let settings = AppSettings::get_or_default(&self.db, owner_id).await?;
        let sender = Sender::from_settings(&settings).ok_or(ResolveError::NoSender)?;
        let config = transport_config(&settings, &self.secrets)?.ok_or(MailError::NotConfigured)?;

        Ok(ResolvedMailer {
            mailer: Arc::from(mailer_for(&config)?),
            sender,
        })
    }
}

/// Resolver that sends everything through one mailer
///
/// Owner sends keep the owner's configured sender when one exists.
pub struct StaticResolver {
    db: PgPool,
    mailer: Arc<dyn Mailer>,
    fallback_sender: Sender,
}

impl StaticResolver {
    pub fn new(db: PgPool, mailer: Arc<dyn Mailer>, fallback_sender: Sender) -> Self {
        Self {
            db,
            mailer,
            fallback_sender,
        }
    }
}

#[async_trait]
impl MailerResolver for StaticResolver {
    async fn resolve(&self, send: &EmailSend) -> Result<ResolvedMailer, ResolveError> {
        let sender = match send.owner_id {
            Some(owner_id) => AppSettings::find(&self.db, owner_id)
                .await?
                .as_ref()
                .and_then(Sender::from_settings)
                .unwrap_or_else(|| self.fallback_sender.clone()),
            None => self.fallback_sender.clone(),
        };

        Ok(ResolvedMailer {
            mailer: self.mailer.clone(),
            sender,
        })
    }
}
