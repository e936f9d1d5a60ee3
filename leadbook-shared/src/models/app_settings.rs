/// Per-owner application settings
///
/// Branding, sender identity, SMTP credentials and the lead intake key. The
/// SMTP password is stored encrypted (see [`crate::crypto::SecretBox`]) and
/// never leaves the server in plaintext; the lead key is stored as an HMAC
/// digest with a short display prefix.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE app_settings (
///     owner_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     company_name VARCHAR(255),
///     logo_url VARCHAR(512),
///     primary_color VARCHAR(16),
///     from_name VARCHAR(255),
///     from_email VARCHAR(255),
///     reply_to VARCHAR(255),
///     smtp_host VARCHAR(255),
///     smtp_port INTEGER,
///     smtp_username VARCHAR(255),
///     smtp_password_encrypted TEXT,
///     smtp_secure BOOLEAN NOT NULL DEFAULT FALSE,
///     lead_key_prefix VARCHAR(16),
///     lead_key_hash VARCHAR(64) UNIQUE,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

const SETTINGS_COLUMNS: &str = "owner_id, company_name, logo_url, primary_color, from_name, \
                                from_email, reply_to, smtp_host, smtp_port, smtp_username, \
                                smtp_password_encrypted, smtp_secure, lead_key_prefix, \
                                lead_key_hash, updated_at";

/// Stored settings row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppSettings {
    pub owner_id: Uuid,
    pub company_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password_encrypted: Option<String>,
    pub smtp_secure: bool,
    pub lead_key_prefix: Option<String>,
    pub lead_key_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Settings as returned to the owner: no secrets, only presence flags
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub company_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_secure: bool,
    pub smtp_password_set: bool,
    pub lead_key_prefix: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial settings update. `smtp_password_encrypted: Some(None)` clears the
/// stored password.
#[derive(Debug, Clone, Default)]
pub struct UpdateAppSettings {
    pub company_name: Option<Option<String>>,
    pub logo_url: Option<Option<String>>,
    pub primary_color: Option<Option<String>>,
    pub from_name: Option<Option<String>>,
    pub from_email: Option<Option<String>>,
    pub reply_to: Option<Option<String>>,
    pub smtp_host: Option<Option<String>>,
    pub smtp_port: Option<Option<i32>>,
    pub smtp_username: Option<Option<String>>,
    pub smtp_password_encrypted: Option<Option<String>>,
    pub smtp_secure: Option<bool>,
}

impl AppSettings {
    /// Empty settings for an owner who has never saved any
    pub fn empty(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            company_name: None,
            logo_url: None,
            primary_color: None,
            from_name: None,
            from_email: None,
            reply_to: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password_encrypted: None,
            smtp_secure: false,
            lead_key_prefix: None,
            lead_key_hash: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether enough SMTP configuration exists to attempt delivery
    pub fn has_transport(&self) -> bool {
        self.smtp_host
            .as_deref()
            .map(|h| !h.trim().is_empty())
            .unwrap_or(false)
    }

    /// View safe to return to clients: no password or key digest
    pub fn to_public(&self) -> PublicSettings {
        PublicSettings {
            company_name: self.company_name.clone(),
            logo_url: self.logo_url.clone(),
            primary_color: self.primary_color.clone(),
            from_name: self.from_name.clone(),
            from_email: self.from_email.clone(),
            reply_to: self.reply_to.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_username: self.smtp_username.clone(),
            smtp_secure: self.smtp_secure,
            smtp_password_set: self.smtp_password_encrypted.is_some(),
            lead_key_prefix: self.lead_key_prefix.clone(),
            updated_at: Some(self.updated_at),
        }
    }

    /// Loads an owner's settings, if saved
    pub async fn find(pool: &PgPool, owner_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM app_settings WHERE owner_id = $1",
            SETTINGS_COLUMNS
        );

        sqlx::query_as::<_, AppSettings>(&query)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Loads an owner's settings, falling back to [`AppSettings::empty`]
    pub async fn get_or_default(pool: &PgPool, owner_id: Uuid) -> Result<Self, sqlx::Error> {
        Ok(Self::find(pool, owner_id)
            .await?
            .unwrap_or_else(|| Self::empty(owner_id)))
    }

    /// Applies a partial update, creating the row on first save
    pub async fn upsert(
        pool: &PgPool,
        owner_id: Uuid,
        data: UpdateAppSettings,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query("INSERT INTO app_settings (owner_id) VALUES ($1) ON CONFLICT (owner_id) DO NOTHING")
            .bind(owner_id)
            .execute(pool)
            .await?;

        let mut query = String::from("UPDATE app_settings SET updated_at = NOW()");
        let mut bind_count = 1;

        let columns = [
            ("company_name", data.company_name.is_some()),
            ("logo_url", data.logo_url.is_some()),
            ("primary_color", data.primary_color.is_some()),
            ("from_name", data.from_name.is_some()),
            ("from_email", data.from_email.is_some()),
            ("reply_to", data.reply_to.is_some()),
            ("smtp_host", data.smtp_host.is_some()),
            ("smtp_port", data.smtp_port.is_some()),
            ("smtp_username", data.smtp_username.is_some()),
            ("smtp_password_encrypted", data.smtp_password_encrypted.is_some()),
            ("smtp_secure", data.smtp_secure.is_some()),
        ];

        for (column, present) in columns {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        }

        query.push_str(&format!(" WHERE owner_id = $1 RETURNING {}", SETTINGS_COLUMNS));

        let mut q = sqlx::query_as::<_, AppSettings>(&query).bind(owner_id);

        if let Some(v) = data.company_name {
            q = q.bind(v);
        }
        if let Some(v) = data.logo_url {
            q = q.bind(v);
        }
        if let Some(v) = data.primary_color {
            q = q.bind(v);
        }
        if let Some(v) = data.from_name {
            q = q.bind(v);
        }
        if let Some(v) = data.from_email {
            q = q.bind(v);
        }
        if let Some(v) = data.reply_to {
            q = q.bind(v);
        }
        if let Some(v) = data.smtp_host {
            q = q.bind(v);
        }
        if let Some(v) = data.smtp_port {
            q = q.bind(v);
        }
        if let Some(v) = data.smtp_username {
            q = q.bind(v);
        }
        if let Some(v) = data.smtp_password_encrypted {
            q = q.bind(v);
        }
        if let Some(v) = data.smtp_secure {
            q = q.bind(v);
        }

        q.fetch_one(pool).await
    }

    /// Stores a new lead key digest, replacing any previous key
    pub async fn set_lead_key(
        pool: &PgPool,
        owner_id: Uuid,
        prefix: &str,
        key_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO app_settings (owner_id, lead_key_prefix, lead_key_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id) DO UPDATE
            SET lead_key_prefix = EXCLUDED.lead_key_prefix,
                lead_key_hash = EXCLUDED.lead_key_hash,
                updated_at = NOW()
            RETURNING {}
            "#,
            SETTINGS_COLUMNS
        );

        sqlx::query_as::<_, AppSettings>(&query)
            .bind(owner_id)
            .bind(prefix)
            .bind(key_hash)
            .fetch_one(pool)
            .await
    }

    /// Resolves the owner of a lead key digest
    pub async fn find_owner_by_lead_key(
        pool: &PgPool,
        key_hash: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT owner_id FROM app_settings WHERE lead_key_hash = $1")
                .bind(key_hash)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|(owner_id,)| owner_id))
    }
}
