/// Opaque bearer session lifecycle
///
/// [`SessionManager`] issues a session token and a refresh token on login,
/// verifies presented tokens, rotates both on refresh and revokes sessions on
/// logout or credential changes. Tokens are opaque (see [`super::token`]) and
/// only their HMAC digests reach the database.
///
/// # Lifetimes
///
/// - Access token: 7 days by default
/// - Refresh window: 30 days from login by default
///
/// An access token presented after its expiry fails with
/// [`SessionError::Expired`] but leaves the session row in place; clients then
/// exchange the refresh token, which keeps working until the refresh window
/// closes. Only once that window has also passed is the row deleted.
///
/// # Example
///
/// ```no_run
/// use leadbook_shared::auth::session::{SessionConfig, SessionManager};
/// use leadbook_shared::models::audit_log::RequestMeta;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let sessions = SessionManager::new(pool, SessionConfig::new("a-secret-of-at-least-32-characters!!"));
///
/// let issued = sessions.issue(user_id, &RequestMeta::default()).await?;
/// let verified = sessions.verify(&issued.access_token).await?;
/// assert_eq!(verified.user_id, user_id);
///
/// sessions.revoke(verified.session_id).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::token::{generate_token, hash_token, validate_token_format, TokenKind};
use crate::models::audit_log::RequestMeta;
use crate::models::session::{CreateSession, Session};
use crate::models::user::User;

/// Default access token lifetime
pub const DEFAULT_ACCESS_TTL_DAYS: i64 = 7;

/// Default refresh window
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 30;

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token is malformed or unknown
    #[error("Invalid session token")]
    Invalid,

    /// Token was valid but has expired
    #[error("Session expired")]
    Expired,

    /// Refresh token is unknown, already rotated, or past its window
    #[error("Invalid or expired refresh token")]
    RefreshRejected,

    /// Session points at a user that no longer exists
    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server secret keying the token digests
    pub secret: String,

    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::days(DEFAULT_ACCESS_TTL_DAYS),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }
}

/// Tokens handed to the client after login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of verifying an access token
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// Issues, verifies, rotates and revokes sessions
#[derive(Clone)]
pub struct SessionManager {
    pool: PgPool,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(pool: PgPool, config: SessionConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a session for a user
    pub async fn issue(
        &self,
        user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<IssuedSession, SessionError> {
        let now = Utc::now();
        let access_token = generate_token(TokenKind::Session);
        let refresh_token = generate_token(TokenKind::Refresh);

        let session = Session::create(
            &self.pool,
            CreateSession {
                user_id,
                token_hash: hash_token(&access_token, &self.config.secret),
                refresh_token_hash: hash_token(&refresh_token, &self.config.secret),
                expires_at: now + self.config.access_ttl,
                refresh_expires_at: now + self.config.refresh_ttl,
                user_agent: meta.user_agent.clone(),
                ip_address: meta.ip_address.clone(),
            },
        )
        .await?;

        tracing::debug!(session_id = %session.id, user_id = %user_id, "Session issued");

        Ok(IssuedSession {
            session_id: session.id,
            access_token,
            refresh_token,
            expires_at: session.expires_at,
            refresh_expires_at: session.refresh_expires_at,
        })
    }

    /// Resolves an access token to its session and user
    ///
    /// # Errors
    ///
    /// - [`SessionError::Invalid`] for malformed or unknown tokens
    /// - [`SessionError::Expired`] when the token has expired; the row is kept
    ///   for refresh and deleted only once the refresh window has closed
    pub async fn verify(&self, token: &str) -> Result<VerifiedSession, SessionError> {
        if !validate_token_format(token, TokenKind::Session) {
            return Err(SessionError::Invalid);
        }

        let token_hash = hash_token(token, &self.config.secret);
        let session = Session::find_by_token_hash(&self.pool, &token_hash)
            .await?
            .ok_or(SessionError::Invalid)?;

        let now = Utc::now();
        if session.is_expired_at(now) {
            if !session.can_refresh_at(now) {
                Session::delete(&self.pool, session.id).await?;
            }
            return Err(SessionError::Expired);
        }

        let user = User::find_by_id(&self.pool, session.user_id)
            .await?
            .ok_or(SessionError::UserNotFound)?;

        Ok(VerifiedSession {
            session_id: session.id,
            user_id: user.id,
            user,
            expires_at: session.expires_at,
        })
    }

    /// Exchanges a refresh token for a fresh token pair
    ///
    /// The refresh window is fixed at login; rotation extends only the access
    /// expiry. A refresh token can be used once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, SessionError> {
        if !validate_token_format(refresh_token, TokenKind::Refresh) {
            return Err(SessionError::RefreshRejected);
        }

        let old_hash = hash_token(refresh_token, &self.config.secret);
        let session = Session::find_by_refresh_hash(&self.pool, &old_hash)
            .await?
            .ok_or(SessionError::RefreshRejected)?;

        let now = Utc::now();
        if !session.can_refresh_at(now) {
            Session::delete(&self.pool, session.id).await?;
            return Err(SessionError::RefreshRejected);
        }

        let access_token = generate_token(TokenKind::Session);
        let new_refresh = generate_token(TokenKind::Refresh);
        let expires_at = (now + self.config.access_ttl).min(session.refresh_expires_at);

        let rotated = Session::rotate(
            &self.pool,
            session.id,
            &old_hash,
            &hash_token(&access_token, &self.config.secret),
            &hash_token(&new_refresh, &self.config.secret),
            expires_at,
        )
        .await?
        .ok_or(SessionError::RefreshRejected)?;

        tracing::debug!(session_id = %rotated.id, "Session refreshed");

        Ok(IssuedSession {
            session_id: rotated.id,
            access_token,
            refresh_token: new_refresh,
            expires_at: rotated.expires_at,
            refresh_expires_at: rotated.refresh_expires_at,
        })
    }

    /// Ends one session
    pub async fn revoke(&self, session_id: Uuid) -> Result<bool, SessionError> {
        Ok(Session::delete(&self.pool, session_id).await?)
    }

    /// Ends every session of a user, optionally keeping the caller's own
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
    ) -> Result<u64, SessionError> {
        let removed = Session::delete_for_user(&self.pool, user_id, except).await?;
        tracing::info!(user_id = %user_id, removed, "Sessions revoked");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lifetimes() {
        let config = SessionConfig::new("secret");
        assert_eq!(config.access_ttl, Duration::days(7));
        assert_eq!(config.refresh_ttl, Duration::days(30));
    }

    #[test]
    fn test_issued_session_serializes_tokens() {
        let issued = IssuedSession {
            session_id: Uuid::new_v4(),
            access_token: "lbs_x".to_string(),
            refresh_token: "lbr_y".to_string(),
            expires_at: Utc::now(),
            refresh_expires_at: Utc::now(),
        };

        let json = serde_json::to_value(&issued).unwrap();
        assert_eq!(json["access_token"], "lbs_x");
        assert_eq!(json["refresh_token"], "lbr_y");
    }
}
