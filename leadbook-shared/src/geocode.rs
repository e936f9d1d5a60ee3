/// Address geocoding with a database cache
///
/// [`Geocoder::geocode`] trims the address, answers from `geocode_cache` when
/// it can, and otherwise asks the configured [`GeocodeProvider`] and stores
/// the answer. The default provider speaks the Nominatim search API, which
/// requires an identifying User-Agent.
///
/// # Example
///
/// ```no_run
/// use leadbook_shared::geocode::{Geocoder, NominatimProvider};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let provider = NominatimProvider::new(
///     "https://nominatim.openstreetmap.org",
///     "leadbook/0.1 (ops@example.com)",
/// )?;
/// let geocoder = Geocoder::new(pool, provider);
///
/// let hit = geocoder.geocode("10 Downing Street, London").await?;
/// println!("{}, {} (cached: {})", hit.lat, hit.lon, hit.cached);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::models::geocode_cache::GeocodeCacheEntry;

/// Default public Nominatim instance
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Longest address accepted
pub const MAX_ADDRESS_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// Empty or oversized address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Provider had no match
    #[error("No location found for address")]
    NotFound,

    /// Provider unreachable or answered with an error
    #[error("Geocoding provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A resolved location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lon: f64,
    pub display_name: Option<String>,
    pub provider: String,

    /// Served from the cache
    pub cached: bool,
}

/// Source of coordinates for free-text addresses
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Identifier stored with cached results
    fn name(&self) -> &str;

    /// Best match for `address`, or `None`
    async fn lookup(&self, address: &str) -> Result<Option<GeocodeResult>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: Option<String>,
}

/// Nominatim-compatible search provider
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimProvider {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn parse(places: Vec<NominatimPlace>) -> Result<Option<GeocodeResult>, GeocodeError> {
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat: f64 = place
            .lat
            .parse()
            .map_err(|_| GeocodeError::Provider(format!("bad latitude {:?}", place.lat)))?;
        let lon: f64 = place
            .lon
            .parse()
            .map_err(|_| GeocodeError::Provider(format!("bad longitude {:?}", place.lon)))?;

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GeocodeError::Provider("coordinates out of range".to_string()));
        }

        Ok(Some(GeocodeResult {
            lat,
            lon,
            display_name: place.display_name,
            provider: "nominatim".to_string(),
            cached: false,
        }))
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn lookup(&self, address: &str) -> Result<Option<GeocodeResult>, GeocodeError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("limit", "1"), ("q", address)])
            .send()
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Provider(format!("HTTP {}", status.as_u16())));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        Self::parse(places)
    }
}

/// Normalizes an address into its cache key
pub fn normalize_address(address: &str) -> Result<String, GeocodeError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(GeocodeError::InvalidAddress("address is empty".to_string()));
    }
    if trimmed.chars().count() > MAX_ADDRESS_LEN {
        return Err(GeocodeError::InvalidAddress(format!(
            "address exceeds {} characters",
            MAX_ADDRESS_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Cached geocoding front end
#[derive(Clone)]
pub struct Geocoder {
    pool: PgPool,
    provider: Arc<dyn GeocodeProvider>,
}

impl Geocoder {
    pub fn new<P: GeocodeProvider + 'static>(pool: PgPool, provider: P) -> Self {
        Self {
            pool,
            provider: Arc::new(provider),
        }
    }

    pub fn with_provider(pool: PgPool, provider: Arc<dyn GeocodeProvider>) -> Self {
        Self { pool, provider }
    }

    /// Resolves an address, consulting the cache first
    pub async fn geocode(&self, address: &str) -> Result<GeocodeResult, GeocodeError> {
        let key = normalize_address(address)?;

        if let Some(entry) = GeocodeCacheEntry::find(&self.pool, &key).await? {
            return Ok(GeocodeResult {
                lat: entry.lat,
                lon: entry.lon,
                display_name: entry.display_name,
                provider: entry.provider,
                cached: true,
            });
        }

        let result = self
            .provider
            .lookup(&key)
            .await?
            .ok_or(GeocodeError::NotFound)?;

        GeocodeCacheEntry::store(
            &self.pool,
            &key,
            result.lat,
            result.lon,
            result.display_name.as_deref(),
            self.provider.name(),
        )
        .await?;

        tracing::debug!(provider = self.provider.name(), "Geocoded address");

        Ok(result)
    }
}
