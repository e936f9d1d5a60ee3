/// Email send log and delivery queue
///
/// Every outbound message is first written here as `queued`. The worker
/// claims due rows, delivers them and moves them to `sent` or, after the
/// retry budget is spent, `failed`. Rows are never deleted so the table
/// doubles as the send history shown to owners.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_sends (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     owner_id UUID REFERENCES users(id) ON DELETE CASCADE,  -- NULL for system mail
///     template_id UUID REFERENCES email_templates(id) ON DELETE SET NULL,
///     client_id UUID REFERENCES clients(id) ON DELETE SET NULL,
///     kind VARCHAR(16) NOT NULL,              -- single | newsletter | system
///     to_addresses TEXT[] NOT NULL DEFAULT '{}',
///     bcc_addresses TEXT[] NOT NULL DEFAULT '{}',
///     subject VARCHAR(512) NOT NULL,
///     body_html TEXT NOT NULL,
///     body_text TEXT,
///     status VARCHAR(16) NOT NULL DEFAULT 'queued',  -- queued | sent | failed
///     error TEXT,
///     attempts INTEGER NOT NULL DEFAULT 0,
///     next_attempt_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     claimed_at TIMESTAMPTZ,
///     provider_message_id VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     sent_at TIMESTAMPTZ
/// );
/// ```
///
/// # Claiming
///
/// [`EmailSend::claim_due`] uses `FOR UPDATE SKIP LOCKED` so several worker
/// processes can poll the same table. A claim sets `claimed_at`; a row whose
/// claim is older than the lease is considered abandoned and claimable again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const SEND_COLUMNS: &str = "id, owner_id, template_id, client_id, kind, to_addresses, \
                            bcc_addresses, subject, body_html, body_text, status, error, \
                            attempts, next_attempt_at, claimed_at, provider_message_id, \
                            created_at, sent_at";

/// Delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Queued,
    Sent,
    Failed,
}

impl SendStatus {
    /// Converts to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Queued => "queued",
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }

    /// Parses a stored value; `None` for unknown values
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(SendStatus::Queued),
            "sent" => Some(SendStatus::Sent),
            "failed" => Some(SendStatus::Failed),
            _ => None,
        }
    }
}

/// What produced the send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendKind {
    /// One message to one client or address
    Single,

    /// One chunk of a BCC newsletter
    Newsletter,

    /// Platform mail (password reset) delivered through the system mailer
    System,
}

impl SendKind {
    /// Converts to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SendKind::Single => "single",
            SendKind::Newsletter => "newsletter",
            SendKind::System => "system",
        }
    }

    /// Parses a stored value; `None` for unknown values
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "single" => Some(SendKind::Single),
            "newsletter" => Some(SendKind::Newsletter),
            "system" => Some(SendKind::System),
            _ => None,
        }
    }
}

/// Stored send
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailSend {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub kind: String,
    pub to_addresses: Vec<String>,
    pub bcc_addresses: Vec<String>,
    pub subject: String,

    #[serde(skip_serializing)]
    pub body_html: String,

    #[serde(skip_serializing)]
    pub body_text: Option<String>,

    pub status: String,
    pub error: Option<String>,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A message to enqueue
#[derive(Debug, Clone)]
pub struct NewEmailSend {
    pub owner_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub kind: SendKind,
    pub to_addresses: Vec<String>,
    pub bcc_addresses: Vec<String>,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
}

/// Exponential backoff before the next attempt: 30s, 60s, 120s, ...
pub fn retry_delay(attempts: i32) -> chrono::Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 10) as u32;
    chrono::Duration::seconds(30 * 2i64.pow(exponent))
}

impl EmailSend {
    /// Parsed delivery status
    pub fn get_status(&self) -> Option<SendStatus> {
        SendStatus::from_str(&self.status)
    }

    /// Parsed send kind
    pub fn get_kind(&self) -> Option<SendKind> {
        SendKind::from_str(&self.kind)
    }

    /// Number of recipients across To and BCC
    pub fn recipient_count(&self) -> usize {
        self.to_addresses.len() + self.bcc_addresses.len()
    }

    /// Queues one message
    pub async fn enqueue(pool: &PgPool, data: NewEmailSend) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_sends (owner_id, template_id, client_id, kind, to_addresses, \
             bcc_addresses, subject, body_html, body_text) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            SEND_COLUMNS
        );

        sqlx::query_as::<_, EmailSend>(&query)
            .bind(data.owner_id)
            .bind(data.template_id)
            .bind(data.client_id)
            .bind(data.kind.as_str())
            .bind(data.to_addresses)
            .bind(data.bcc_addresses)
            .bind(data.subject)
            .bind(data.body_html)
            .bind(data.body_text)
            .fetch_one(pool)
            .await
    }

    /// Queues several messages atomically (newsletter chunks)
    pub async fn enqueue_batch(
        pool: &PgPool,
        batch: Vec<NewEmailSend>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_sends (owner_id, template_id, client_id, kind, to_addresses, \
             bcc_addresses, subject, body_html, body_text) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            SEND_COLUMNS
        );

        let mut tx = pool.begin().await?;
        let mut sends = Vec::with_capacity(batch.len());

        for data in batch {
            let send = sqlx::query_as::<_, EmailSend>(&query)
                .bind(data.owner_id)
                .bind(data.template_id)
                .bind(data.client_id)
                .bind(data.kind.as_str())
                .bind(data.to_addresses)
                .bind(data.bcc_addresses)
                .bind(data.subject)
                .bind(data.body_html)
                .bind(data.body_text)
                .fetch_one(&mut *tx)
                .await?;
            sends.push(send);
        }

        tx.commit().await?;
        Ok(sends)
    }

    /// Send history of an owner, newest first
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: Uuid,
        status: Option<SendStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_sends \
             WHERE owner_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            SEND_COLUMNS
        );

        sqlx::query_as::<_, EmailSend>(&query)
            .bind(owner_id)
            .bind(status.map(|s| s.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Finds a send by ID without owner scoping (worker side)
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM email_sends WHERE id = $1", SEND_COLUMNS);

        sqlx::query_as::<_, EmailSend>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claims up to `limit` due sends
    ///
    /// A row is due when it is queued, its `next_attempt_at` has passed and it
    /// is either unclaimed or its claim is older than `lease`.
    pub async fn claim_due(
        pool: &PgPool,
        limit: i64,
        lease: chrono::Duration,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let stale_before = Utc::now() - lease;

        let query = r#"
            WITH due AS (
                SELECT id FROM email_sends
                WHERE status = 'queued'
                  AND next_attempt_at <= NOW()
                  AND (claimed_at IS NULL OR claimed_at < $2)
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE email_sends
            SET claimed_at = NOW(), attempts = attempts + 1
            FROM due
            WHERE email_sends.id = due.id
            RETURNING email_sends.*
            "#;

        sqlx::query_as::<_, EmailSend>(query)
            .bind(limit)
            .bind(stale_before)
            .fetch_all(pool)
            .await
    }

    /// Records successful delivery
    pub async fn mark_sent(
        pool: &PgPool,
        id: Uuid,
        provider_message_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_sends
            SET status = 'sent', sent_at = NOW(), provider_message_id = $2,
                error = NULL, claimed_at = NULL
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Releases the claim and schedules another attempt
    pub async fn mark_retry(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_sends
            SET error = $2, next_attempt_at = $3, claimed_at = NULL
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Gives up on a send
    pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_sends
            SET status = 'failed', error = $2, claimed_at = NULL
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of queued sends (for health and worker logs)
    pub async fn count_queued(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM email_sends WHERE status = 'queued'")
                .fetch_one(pool)
                .await?;

        Ok(count)
    }
}
