/// Audit log
///
/// Append-only record of security-relevant account events. Writes are
/// best effort: [`AuditLog::record`] logs and swallows database errors so an
/// audit failure never blocks a login.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE audit_logs (
///     id BIGSERIAL PRIMARY KEY,
///     user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     email VARCHAR(255),
///     event VARCHAR(64) NOT NULL,
///     ip_address VARCHAR(64),
///     user_agent VARCHAR(512),
///     details JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Audited event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Signup,
    Login,
    LoginFailed,
    Logout,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
    LicenseUpdated,
}

impl AuditEvent {
    /// Event name as stored in `audit_logs.event`
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Signup => "signup",
            AuditEvent::Login => "login",
            AuditEvent::LoginFailed => "login_failed",
            AuditEvent::Logout => "logout",
            AuditEvent::PasswordChanged => "password_changed",
            AuditEvent::PasswordResetRequested => "password_reset_requested",
            AuditEvent::PasswordReset => "password_reset",
            AuditEvent::LicenseUpdated => "license_updated",
        }
    }
}

/// Request metadata attached to audit entries
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Stored audit entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub event: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Appends an entry; database errors are logged, not returned
    pub async fn record(
        pool: &PgPool,
        event: AuditEvent,
        user_id: Option<Uuid>,
        email: Option<&str>,
        meta: &RequestMeta,
        details: JsonValue,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, email, event, ip_address, user_agent, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(event.as_str())
        .bind(meta.ip_address.as_deref())
        .bind(meta.user_agent.as_deref())
        .bind(details)
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, event = event.as_str(), "Failed to write audit log");
        }
    }

    /// Most recent entries, optionally filtered by user
    pub async fn list_recent(
        pool: &PgPool,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, user_id, email, event, ip_address, user_agent, details, created_at
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_match_serde() {
        for event in [
            AuditEvent::Signup,
            AuditEvent::Login,
            AuditEvent::LoginFailed,
            AuditEvent::Logout,
            AuditEvent::PasswordChanged,
            AuditEvent::PasswordResetRequested,
            AuditEvent::PasswordReset,
            AuditEvent::LicenseUpdated,
        ] {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, event.as_str());
        }
    }
}
