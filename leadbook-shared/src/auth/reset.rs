/// Password reset flow
///
/// `request` never reveals whether an account exists: it returns `Ok` for
/// unknown emails too. For a known account it stores a 24-hour single-use
/// token and queues a system email carrying the reset link. `confirm`
/// consumes the token, sets the new password and revokes every session.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::password::{hash_password, validate_password_strength, PasswordError};
use super::token::{generate_token, hash_token, validate_token_format, TokenKind};
use crate::models::email_send::{EmailSend, NewEmailSend, SendKind};
use crate::models::password_reset::PasswordResetToken;
use crate::models::session::Session;
use crate::models::user::User;

/// Reset token lifetime
pub const RESET_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    /// Unknown, used or expired token
    #[error("Invalid or expired reset token")]
    InvalidToken,

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Password hashing failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a reset request, for audit logging
#[derive(Debug, Clone)]
pub struct ResetRequested {
    pub user_id: Uuid,
    pub send_id: Uuid,
}

/// Reset link placed in the email
pub fn reset_link(app_base_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        app_base_url.trim_end_matches('/'),
        token
    )
}

fn reset_email(link: &str) -> (String, String, String) {
    let subject = "Reset your Leadbook password".to_string();
    let html = format!(
        "<p>We received a request to reset your password.</p>\
         <p><a href=\"{link}\">Choose a new password</a></p>\
         <p>The link is valid for {RESET_TOKEN_TTL_HOURS} hours. \
         If you did not ask for this, you can ignore this email.</p>"
    );
    let text = format!(
        "We received a request to reset your password.\n\n\
         Choose a new password: {link}\n\n\
         The link is valid for {RESET_TOKEN_TTL_HOURS} hours. \
         If you did not ask for this, you can ignore this email.\n"
    );
    (subject, html, text)
}

/// Starts a reset for `email`
///
/// Returns `Ok(None)` when no account matches; callers must respond the same
/// way in both cases.
pub async fn request(
    pool: &PgPool,
    secret: &str,
    app_base_url: &str,
    email: &str,
) -> Result<Option<ResetRequested>, ResetError> {
    let Some(user) = User::find_by_email(pool, email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(None);
    };

    PasswordResetToken::invalidate_for_user(pool, user.id).await?;

    let token = generate_token(TokenKind::PasswordReset);
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
    PasswordResetToken::create(pool, user.id, &hash_token(&token, secret), expires_at).await?;

    let (subject, body_html, body_text) = reset_email(&reset_link(app_base_url, &token));

    let send = EmailSend::enqueue(
        pool,
        NewEmailSend {
            owner_id: None,
            template_id: None,
            client_id: None,
            kind: SendKind::System,
            to_addresses: vec![user.email.clone()],
            bcc_addresses: Vec::new(),
            subject,
            body_html,
            body_text: Some(body_text),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, send_id = %send.id, "Password reset email queued");

    Ok(Some(ResetRequested {
        user_id: user.id,
        send_id: send.id,
    }))
}

/// Completes a reset; returns the user whose password changed
pub async fn confirm(
    pool: &PgPool,
    secret: &str,
    token: &str,
    new_password: &str,
) -> Result<User, ResetError> {
    if !validate_token_format(token, TokenKind::PasswordReset) {
        return Err(ResetError::InvalidToken);
    }

    validate_password_strength(new_password).map_err(ResetError::WeakPassword)?;

    let record = PasswordResetToken::find_by_hash(pool, &hash_token(token, secret))
        .await?
        .ok_or(ResetError::InvalidToken)?;

    if !record.is_usable_at(Utc::now()) {
        return Err(ResetError::InvalidToken);
    }

    // Claim the token first so a concurrent confirm cannot reuse it
    if !PasswordResetToken::mark_used(pool, record.id).await? {
        return Err(ResetError::InvalidToken);
    }

    let password_hash = hash_password(new_password)?;
    if !User::set_password_hash(pool, record.user_id, &password_hash).await? {
        return Err(ResetError::InvalidToken);
    }

    let user = User::find_by_id(pool, record.user_id)
        .await?
        .ok_or(ResetError::InvalidToken)?;

    let revoked = Session::delete_for_user(pool, user.id, None).await?;
    tracing::info!(user_id = %user.id, revoked, "Password reset completed");

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link() {
        assert_eq!(
            reset_link("https://app.example.com/", "lbp_abc"),
            "https://app.example.com/reset-password?token=lbp_abc"
        );
        assert_eq!(
            reset_link("http://localhost:3000", "lbp_abc"),
            "http://localhost:3000/reset-password?token=lbp_abc"
        );
    }

    #[test]
    fn test_reset_email_contains_link() {
        let (subject, html, text) = reset_email("https://x.test/reset-password?token=t");
        assert!(subject.contains("Reset"));
        assert!(html.contains("href=\"https://x.test/reset-password?token=t\""));
        assert!(text.contains("https://x.test/reset-password?token=t"));
    }
}
