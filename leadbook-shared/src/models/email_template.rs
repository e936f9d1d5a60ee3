/// Email template model
///
/// Templates are owner-scoped and named uniquely per owner. Subject and
/// bodies may contain `{{ variable }}` placeholders that
/// [`crate::email::template::render`] fills in at send time.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_templates (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     name VARCHAR(128) NOT NULL,
///     subject VARCHAR(512) NOT NULL,
///     body_html TEXT NOT NULL,
///     body_text TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT email_templates_owner_name_key UNIQUE (owner_id, name)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Name of the unique constraint on (owner_id, name)
pub const UNIQUE_NAME_CONSTRAINT: &str = "email_templates_owner_name_key";

const TEMPLATE_COLUMNS: &str =
    "id, owner_id, name, subject, body_html, body_text, created_at, updated_at";

/// Stored email template
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a template
#[derive(Debug, Clone)]
pub struct CreateEmailTemplate {
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
}

/// Partial template update
#[derive(Debug, Clone, Default)]
pub struct UpdateEmailTemplate {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body_html: Option<String>,
    pub body_text: Option<Option<String>>,
}

/// True when a database error is a duplicate template name
pub fn is_duplicate_name(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(UNIQUE_NAME_CONSTRAINT),
        _ => false,
    }
}

impl EmailTemplate {
    /// Creates a template
    ///
    /// # Errors
    ///
    /// Fails with a unique violation (see [`is_duplicate_name`]) when the
    /// owner already has a template with this name.
    pub async fn create(pool: &PgPool, data: CreateEmailTemplate) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_templates (owner_id, name, subject, body_html, body_text) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            TEMPLATE_COLUMNS
        );

        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(data.owner_id)
            .bind(data.name.trim())
            .bind(data.subject)
            .bind(data.body_html)
            .bind(data.body_text)
            .fetch_one(pool)
            .await
    }

    /// Finds a template by ID within the owner's templates
    pub async fn find(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_templates WHERE id = $1 AND owner_id = $2",
            TEMPLATE_COLUMNS
        );

        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Lists an owner's templates by name
    pub async fn list(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_templates WHERE owner_id = $1 ORDER BY name",
            TEMPLATE_COLUMNS
        );

        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }

    /// Applies a partial update; `None` when the template is not the owner's
    pub async fn update(
        pool: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        data: UpdateEmailTemplate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE email_templates SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.subject.is_some() {
            bind_count += 1;
            query.push_str(&format!(", subject = ${}", bind_count));
        }
        if data.body_html.is_some() {
            bind_count += 1;
            query.push_str(&format!(", body_html = ${}", bind_count));
        }
        if data.body_text.is_some() {
            bind_count += 1;
            query.push_str(&format!(", body_text = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND owner_id = $2 RETURNING {}",
            TEMPLATE_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, EmailTemplate>(&query).bind(id).bind(owner_id);

        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(subject) = data.subject {
            q = q.bind(subject);
        }
        if let Some(body_html) = data.body_html {
            q = q.bind(body_html);
        }
        if let Some(body_text) = data.body_text {
            q = q.bind(body_text);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a template; false when nothing matched
    pub async fn delete(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM email_templates WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
