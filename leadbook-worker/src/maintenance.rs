/// Periodic cleanup of expired credentials
///
/// Removes sessions past their refresh expiry and password reset tokens that
/// are used or expired.

use leadbook_shared::models::{password_reset::PasswordResetToken, session::Session};
use sqlx::PgPool;

/// Rows removed by one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub sessions: u64,
    pub reset_tokens: u64,
}

/// Runs one cleanup pass
pub async fn prune(pool: &PgPool) -> Result<PruneReport, sqlx::Error> {
    let report = PruneReport {
        sessions: Session::prune_expired(pool).await?,
        reset_tokens: PasswordResetToken::prune(pool).await?,
    };

    if report.sessions > 0 || report.reset_tokens > 0 {
        tracing::info!(
            sessions = report.sessions,
            reset_tokens = report.reset_tokens,
            "Pruned expired credentials"
        );
    }

    Ok(report)
}
