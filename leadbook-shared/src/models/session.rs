/// Session model
///
/// A session row binds a hashed bearer token (and a hashed refresh token) to
/// a user until `expires_at`. Rows are created on login, removed on logout,
/// password change or reset, and removed lazily when a verification finds
/// them expired.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE sessions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     refresh_token_hash VARCHAR(64) NOT NULL UNIQUE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     refresh_expires_at TIMESTAMPTZ NOT NULL,
///     user_agent VARCHAR(512),
///     ip_address VARCHAR(64),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, user_id, token_hash, refresh_token_hash, expires_at, \
                               refresh_expires_at, user_agent, ip_address, created_at";

/// Stored session
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(skip_serializing)]
    pub token_hash: String,

    #[serde(skip_serializing)]
    pub refresh_token_hash: String,

    /// Access token expiry
    pub expires_at: DateTime<Utc>,

    /// Last moment the refresh token may be exchanged
    pub refresh_expires_at: DateTime<Utc>,

    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a session
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    /// Inserts a session row
    pub async fn create(pool: &PgPool, data: CreateSession) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions (user_id, token_hash, refresh_token_hash, expires_at, \
             refresh_expires_at, user_agent, ip_address) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            SESSION_COLUMNS
        );

        sqlx::query_as::<_, Session>(&query)
            .bind(data.user_id)
            .bind(data.token_hash)
            .bind(data.refresh_token_hash)
            .bind(data.expires_at)
            .bind(data.refresh_expires_at)
            .bind(data.user_agent)
            .bind(data.ip_address)
            .fetch_one(pool)
            .await
    }

    /// Looks up a session by access token digest
    pub async fn find_by_token_hash(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM sessions WHERE token_hash = $1", SESSION_COLUMNS);

        sqlx::query_as::<_, Session>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Looks up a session by refresh token digest
    pub async fn find_by_refresh_hash(
        pool: &PgPool,
        refresh_token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM sessions WHERE refresh_token_hash = $1",
            SESSION_COLUMNS
        );

        sqlx::query_as::<_, Session>(&query)
            .bind(refresh_token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Replaces both token digests and extends the access expiry
    ///
    /// Matches on the old refresh digest so two concurrent refreshes with the
    /// same token cannot both succeed.
    pub async fn rotate(
        pool: &PgPool,
        id: Uuid,
        old_refresh_hash: &str,
        token_hash: &str,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE sessions SET token_hash = $3, refresh_token_hash = $4, expires_at = $5 \
             WHERE id = $1 AND refresh_token_hash = $2 RETURNING {}",
            SESSION_COLUMNS
        );

        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(old_refresh_hash)
            .bind(token_hash)
            .bind(refresh_token_hash)
            .bind(expires_at)
            .fetch_optional(pool)
            .await
    }

    /// Deletes one session
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every session of a user, optionally sparing one
    pub async fn delete_for_user(
        pool: &PgPool,
        user_id: Uuid,
        except: Option<Uuid>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE user_id = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(user_id)
        .bind(except)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes sessions whose refresh window has closed
    pub async fn prune_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at < NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts live sessions of a user
    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND expires_at > NOW()")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Whether the access token has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the refresh token can still be exchanged at `now`
    pub fn can_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at > now
    }
}
