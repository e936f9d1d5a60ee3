/// Client (contact) model
///
/// Clients are owner-scoped: every query takes the owner's user ID and
/// filters on it, so one account can never read or touch another's contacts.
///
/// Tags arrive either as a JSON array or as one delimited string (the lead
/// forms send `"vip, spring-promo"`); both go through [`normalize_tags`] before
/// they are stored, and rows are normalized again on read.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE clients (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     first_name VARCHAR(128) NOT NULL DEFAULT '',
///     last_name VARCHAR(128) NOT NULL DEFAULT '',
///     company VARCHAR(255),
///     email CITEXT,
///     phone VARCHAR(64),
///     address VARCHAR(512),
///     city VARCHAR(128),
///     region VARCHAR(128),
///     postal_code VARCHAR(32),
///     country VARCHAR(64),
///     notes TEXT,
///     tags TEXT[] NOT NULL DEFAULT '{}',
///     lat DOUBLE PRECISION,
///     lon DOUBLE PRECISION,
///     geocoded_at TIMESTAMPTZ,
///     status VARCHAR(16) NOT NULL DEFAULT 'lead',
///     lead_source VARCHAR(64),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Longest tag kept after normalization (characters)
pub const MAX_TAG_LEN: usize = 50;

/// Hard cap on page size for client listings
pub const MAX_PAGE_SIZE: i64 = 200;

const CLIENT_COLUMNS: &str = "id, owner_id, first_name, last_name, company, email, phone, \
                              address, city, region, postal_code, country, notes, tags, lat, lon, \
                              geocoded_at, status, lead_source, created_at, updated_at";

/// Pipeline stage of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Lead,
    Prospect,
    Active,
    Inactive,
}

impl ClientStatus {
    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Lead => "lead",
            ClientStatus::Prospect => "prospect",
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
        }
    }

    /// Parses a stored status; `None` for unknown values
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lead" => Some(ClientStatus::Lead),
            "prospect" => Some(ClientStatus::Prospect),
            "active" => Some(ClientStatus::Active),
            "inactive" => Some(ClientStatus::Inactive),
            _ => None,
        }
    }
}

/// Tags as accepted from clients: an array or one delimited string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Delimited(String),
}

impl TagsInput {
    /// Normalized tag list
    pub fn normalize(&self) -> Vec<String> {
        match self {
            TagsInput::List(items) => normalize_tags(items.iter().map(String::as_str)),
            TagsInput::Delimited(raw) => parse_tag_string(raw),
        }
    }
}

impl Default for TagsInput {
    fn default() -> Self {
        TagsInput::List(Vec::new())
    }
}

/// Splits a delimited tag string on `,` `;` `|` or newlines and normalizes it
pub fn parse_tag_string(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(|c| matches!(c, ',' | ';' | '|' | '\n' | '\r')))
}

/// Trims, drops empties, truncates to [`MAX_TAG_LEN`] and removes
/// case-insensitive duplicates, keeping the first spelling.
pub fn normalize_tags<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();

    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }

        let tag: String = trimmed.chars().take(MAX_TAG_LEN).collect();
        if seen.insert(tag.to_lowercase()) {
            tags.push(tag);
        }
    }

    tags
}

/// Stored client
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub geocoded_at: Option<DateTime<Utc>>,
    pub status: String,
    pub lead_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// "First Last", falling back to company, then email
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();

        if !name.is_empty() {
            name.to_string()
        } else if let Some(company) = self.company.as_deref().filter(|c| !c.trim().is_empty()) {
            company.trim().to_string()
        } else {
            self.email.clone().unwrap_or_default()
        }
    }

    /// Single-line postal address built from the address fields
    pub fn geocode_query(&self) -> String {
        [
            self.address.as_deref(),
            self.city.as_deref(),
            self.region.as_deref(),
            self.postal_code.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }

    /// Parsed status
    pub fn get_status(&self) -> Option<ClientStatus> {
        ClientStatus::from_str(&self.status)
    }

    fn normalized(mut self) -> Self {
        self.tags = normalize_tags(self.tags.iter().map(String::as_str));
        self
    }
}

/// Input for creating a client
#[derive(Debug, Clone, Default)]
pub struct CreateClient {
    pub owner_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub status: Option<ClientStatus>,
    pub lead_source: Option<String>,
}

/// Partial client update. Outer `None` leaves a field alone; `Some(None)`
/// clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct UpdateClient {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub region: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub country: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ClientStatus>,
    pub lead_source: Option<Option<String>>,
}

impl UpdateClient {
    /// True when any address field changes, which invalidates coordinates
    pub fn touches_address(&self) -> bool {
        self.address.is_some()
            || self.city.is_some()
            || self.region.is_some()
            || self.postal_code.is_some()
            || self.country.is_some()
    }
}

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFilter {
    pub status: Option<ClientStatus>,

    /// Case-insensitive tag match
    pub tag: Option<String>,

    /// Substring search over name, company and email
    pub q: Option<String>,

    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ClientFilter {
    /// Page size clamped to 1..=MAX_PAGE_SIZE, default 50
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip, never negative
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    fn search_pattern(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
    }

    fn tag(&self) -> Option<String> {
        self.tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

/// Recipient row used by newsletter sends
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRecipient {
    pub id: Uuid,
    pub email: String,
}

impl Client {
    /// Creates a client for an owner
    pub async fn create(pool: &PgPool, data: CreateClient) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO clients (owner_id, first_name, last_name, company, email, phone, address, \
             city, region, postal_code, country, notes, tags, status, lead_source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {}",
            CLIENT_COLUMNS
        );

        let tags = normalize_tags(data.tags.iter().map(String::as_str));

        let client = sqlx::query_as::<_, Client>(&query)
            .bind(data.owner_id)
            .bind(data.first_name.trim())
            .bind(data.last_name.trim())
            .bind(data.company)
            .bind(data.email)
            .bind(data.phone)
            .bind(data.address)
            .bind(data.city)
            .bind(data.region)
            .bind(data.postal_code)
            .bind(data.country)
            .bind(data.notes)
            .bind(tags)
            .bind(data.status.unwrap_or(ClientStatus::Lead).as_str())
            .bind(data.lead_source)
            .fetch_one(pool)
            .await?;

        Ok(client.normalized())
    }

    /// Finds a client by ID within an owner's scope
    pub async fn find(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM clients WHERE id = $1 AND owner_id = $2",
            CLIENT_COLUMNS
        );

        let client = sqlx::query_as::<_, Client>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await?;

        Ok(client.map(Client::normalized))
    }

    /// Lists an owner's clients, newest first
    pub async fn list(
        pool: &PgPool,
        owner_id: Uuid,
        filter: &ClientFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM clients
            WHERE owner_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1 FROM unnest(tags) AS t WHERE lower(t) = $3))
              AND ($4::text IS NULL
                   OR first_name ILIKE $4 OR last_name ILIKE $4
                   OR company ILIKE $4 OR email::text ILIKE $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            CLIENT_COLUMNS
        );

        let clients = sqlx::query_as::<_, Client>(&query)
            .bind(owner_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.tag())
            .bind(filter.search_pattern())
            .bind(filter.limit())
            .bind(filter.offset())
            .fetch_all(pool)
            .await?;

        Ok(clients.into_iter().map(Client::normalized).collect())
    }

    /// Counts an owner's clients
    pub async fn count(pool: &PgPool, owner_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Applies a partial update; clears coordinates when the address changes
    pub async fn update(
        pool: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        data: UpdateClient,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE clients SET updated_at = NOW()");
        let mut bind_count = 2;

        let mut push = |column: &str, present: bool, query: &mut String| {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        };

        push("first_name", data.first_name.is_some(), &mut query);
        push("last_name", data.last_name.is_some(), &mut query);
        push("company", data.company.is_some(), &mut query);
        push("email", data.email.is_some(), &mut query);
        push("phone", data.phone.is_some(), &mut query);
        push("address", data.address.is_some(), &mut query);
        push("city", data.city.is_some(), &mut query);
        push("region", data.region.is_some(), &mut query);
        push("postal_code", data.postal_code.is_some(), &mut query);
        push("country", data.country.is_some(), &mut query);
        push("notes", data.notes.is_some(), &mut query);
        push("tags", data.tags.is_some(), &mut query);
        push("status", data.status.is_some(), &mut query);
        push("lead_source", data.lead_source.is_some(), &mut query);

        if data.touches_address() {
            query.push_str(", lat = NULL, lon = NULL, geocoded_at = NULL");
        }

        query.push_str(&format!(
            " WHERE id = $1 AND owner_id = $2 RETURNING {}",
            CLIENT_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, Client>(&query).bind(id).bind(owner_id);

        if let Some(v) = data.first_name {
            q = q.bind(v.trim().to_string());
        }
        if let Some(v) = data.last_name {
            q = q.bind(v.trim().to_string());
        }
        if let Some(v) = data.company {
            q = q.bind(v);
        }
        if let Some(v) = data.email {
            q = q.bind(v);
        }
        if let Some(v) = data.phone {
            q = q.bind(v);
        }
        if let Some(v) = data.address {
            q = q.bind(v);
        }
        if let Some(v) = data.city {
            q = q.bind(v);
        }
        if let Some(v) = data.region {
            q = q.bind(v);
        }
        if let Some(v) = data.postal_code {
            q = q.bind(v);
        }
        if let Some(v) = data.country {
            q = q.bind(v);
        }
        if let Some(v) = data.notes {
            q = q.bind(v);
        }
        if let Some(v) = data.tags {
            q = q.bind(normalize_tags(v.iter().map(String::as_str)));
        }
        if let Some(v) = data.status {
            q = q.bind(v.as_str());
        }
        if let Some(v) = data.lead_source {
            q = q.bind(v);
        }

        let client = q.fetch_optional(pool).await?;
        Ok(client.map(Client::normalized))
    }

    /// Deletes a client within an owner's scope
    pub async fn delete(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Writes geocoded coordinates back onto the row
    pub async fn set_coordinates(
        pool: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        lat: f64,
        lon: f64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE clients SET lat = $3, lon = $4, geocoded_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 RETURNING {}",
            CLIENT_COLUMNS
        );

        let client = sqlx::query_as::<_, Client>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(lat)
            .bind(lon)
            .fetch_optional(pool)
            .await?;

        Ok(client.map(Client::normalized))
    }

    /// Clients that have coordinates, for the map view
    pub async fn list_located(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM clients WHERE owner_id = $1 AND lat IS NOT NULL AND lon IS NOT NULL \
             ORDER BY last_name, first_name",
            CLIENT_COLUMNS
        );

        let clients = sqlx::query_as::<_, Client>(&query)
            .bind(owner_id)
            .fetch_all(pool)
            .await?;

        Ok(clients.into_iter().map(Client::normalized).collect())
    }

    /// Newsletter recipients: clients with an email, optionally narrowed by
    /// status, tag or an explicit ID list. One row per distinct address.
    pub async fn list_recipients(
        pool: &PgPool,
        owner_id: Uuid,
        status: Option<ClientStatus>,
        tag: Option<&str>,
        client_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ClientRecipient>, sqlx::Error> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty()).map(str::to_lowercase);

        sqlx::query_as::<_, ClientRecipient>(
            r#"
            SELECT DISTINCT ON (lower(email::text)) id, email::text AS email
            FROM clients
            WHERE owner_id = $1
              AND email IS NOT NULL AND email <> ''
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1 FROM unnest(tags) AS t WHERE lower(t) = $3))
              AND ($4::uuid[] IS NULL OR id = ANY($4))
            ORDER BY lower(email::text), created_at
            "#,
        )
        .bind(owner_id)
        .bind(status.map(|s| s.as_str()))
        .bind(tag)
        .bind(client_ids.map(|ids| ids.to_vec()))
        .fetch_all(pool)
        .await
    }
}
