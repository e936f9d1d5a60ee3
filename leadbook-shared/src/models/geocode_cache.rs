/// Geocoding result cache
///
/// Keyed by the trimmed address text exactly as submitted. The cache is
/// shared across owners since it holds only public map data.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE geocode_cache (
///     address TEXT PRIMARY KEY,
///     lat DOUBLE PRECISION NOT NULL,
///     lon DOUBLE PRECISION NOT NULL,
///     display_name TEXT,
///     provider VARCHAR(64) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// Cached geocoding result
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GeocodeCacheEntry {
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub display_name: Option<String>,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl GeocodeCacheEntry {
    /// Looks up a cached result by normalized address
    pub async fn find(pool: &PgPool, address: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GeocodeCacheEntry>(
            r#"
            SELECT address, lat, lon, display_name, provider, created_at
            FROM geocode_cache
            WHERE address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(pool)
        .await
    }

    /// Stores a result; a concurrent insert of the same address wins
    pub async fn store(
        pool: &PgPool,
        address: &str,
        lat: f64,
        lon: f64,
        display_name: Option<&str>,
        provider: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO geocode_cache (address, lat, lon, display_name, provider)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (address) DO NOTHING
            "#,
        )
        .bind(address)
        .bind(lat)
        .bind(lon)
        .bind(display_name)
        .bind(provider)
        .execute(pool)
        .await?;

        Ok(())
    }
}
