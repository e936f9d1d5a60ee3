/// Email send queue
///
/// Claims due rows from `email_sends` and records delivery outcomes.
///
/// # Lifecycle
///
/// ```text
/// queued ──claim──> (claimed, attempts+1) ──deliver ok──> sent
///                         │
///                         ├─ transient error, attempts < max ──> queued (next_attempt_at = now + backoff)
///                         └─ permanent error or attempts >= max ──> failed
/// ```
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so several workers can share the
/// table. A claim older than the lease is treated as abandoned and the row
/// becomes claimable again.
///
/// # Example
///
/// ```no_run
/// use leadbook_worker::queue::SendQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = SendQueue::new(pool);
/// let sends = queue.claim().await?;
/// println!("Claimed {} sends", sends.len());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use leadbook_shared::models::email_send::{retry_delay, EmailSend};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Default number of rows claimed per poll
pub const DEFAULT_BATCH_SIZE: i64 = 20;

/// Default attempts before a send is failed
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default claim lease
pub const DEFAULT_LEASE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Row was no longer queued when the outcome was written
    #[error("Send not queued: {0}")]
    NotQueued(Uuid),
}

/// What to do with a send after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry { at: DateTime<Utc> },
    Fail,
}

/// Decides between retry and failure
///
/// `attempts` already counts the attempt that just failed.
pub fn disposition(
    attempts: i32,
    max_attempts: i32,
    permanent: bool,
    now: DateTime<Utc>,
) -> Disposition {
    if permanent || attempts >= max_attempts {
        Disposition::Fail
    } else {
        Disposition::Retry {
            at: now + retry_delay(attempts),
        }
    }
}

/// Queue handle; cloning shares the pool
#[derive(Clone)]
pub struct SendQueue {
    db: PgPool,
    batch_size: i64,
    max_attempts: i32,
    lease: Duration,
}

impl SendQueue {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lease: Duration::seconds(DEFAULT_LEASE_SECS),
        }
    }

    pub fn with_limits(db: PgPool, batch_size: i64, max_attempts: i32, lease_secs: i64) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            lease: Duration::seconds(lease_secs.max(1)),
        }
    }

    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Claims up to one batch of due sends
    pub async fn claim(&self) -> Result<Vec<EmailSend>, QueueError> {
        let sends = EmailSend::claim_due(&self.db, self.batch_size, self.lease).await?;

        if !sends.is_empty() {
            tracing::info!(count = sends.len(), "Claimed sends");
        }

        Ok(sends)
    }

    /// Number of queued rows, due or not
    pub async fn queued_count(&self) -> Result<i64, QueueError> {
        Ok(EmailSend::count_queued(&self.db).await?)
    }

    pub async fn mark_sent(&self, send_id: Uuid, message_id: Option<&str>) -> Result<(), QueueError> {
        if !EmailSend::mark_sent(&self.db, send_id, message_id).await? {
            return Err(QueueError::NotQueued(send_id));
        }

        tracing::info!(send_id = %send_id, message_id = ?message_id, "Send delivered");
        Ok(())
    }

    /// Records a failed attempt, scheduling a retry or failing the send
    pub async fn record_failure(
        &self,
        send: &EmailSend,
        error: &str,
        permanent: bool,
    ) -> Result<Disposition, QueueError> {
        let outcome = disposition(send.attempts, self.max_attempts, permanent, Utc::now());

        let updated = match outcome {
            Disposition::Retry { at } => {
                tracing::warn!(
                    send_id = %send.id,
                    attempts = send.attempts,
                    next_attempt_at = %at,
                    error = %error,
                    "Send failed, will retry"
                );
                EmailSend::mark_retry(&self.db, send.id, error, at).await?
            }
            Disposition::Fail => {
                tracing::error!(
                    send_id = %send.id,
                    attempts = send.attempts,
                    permanent,
                    error = %error,
                    "Send failed permanently"
                );
                EmailSend::mark_failed(&self.db, send.id, error).await?
            }
        };

        if !updated {
            return Err(QueueError::NotQueued(send.id));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_retries_after_30s() {
        let now = Utc::now();
        assert_eq!(
            disposition(1, 3, false, now),
            Disposition::Retry { at: now + Duration::seconds(30) }
        );
        assert_eq!(
            disposition(2, 3, false, now),
            Disposition::Retry { at: now + Duration::seconds(60) }
        );
    }

    #[test]
    fn test_fails_at_max_attempts() {
        assert_eq!(disposition(3, 3, false, Utc::now()), Disposition::Fail);
        assert_eq!(disposition(4, 3, false, Utc::now()), Disposition::Fail);
    }

    #[test]
    fn test_permanent_fails_immediately() {
        assert_eq!(disposition(1, 3, true, Utc::now()), Disposition::Fail);
    }
}
