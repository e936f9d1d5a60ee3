/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Signup, login, sessions, profile, password reset
/// - `clients`: Client CRUD and per-client geocoding
/// - `leads`: Public lead intake (lead key)
/// - `geocode`: Free-text address geocoding
/// - `map`: Map points feed
/// - `bookings`: Booking PDF rendering
/// - `email`: Templates, preview, single and newsletter sends
/// - `settings`: Company, sender and SMTP settings, lead key
/// - `license`: Caller's license state
/// - `admin`: User licenses and audit log

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod clients;
pub mod email;
pub mod geocode;
pub mod health;
pub mod leads;
pub mod license;
pub mod map;
pub mod settings;

use serde::{Deserialize, Deserializer};

/// `?limit=&offset=` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Page size clamped to 1..=`max`, `default` when absent
    pub fn limit_or(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }

    /// Rows to skip; negative values count as 0
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH bodies; pair with `#[serde(default)]`
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims a string, mapping blank to `None`
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
