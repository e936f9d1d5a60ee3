/// Free-text geocoding
///
/// `POST /v1/geocode` with `{"address": "..."}`. Results are cached by the
/// trimmed address text, so repeated lookups do not hit the provider.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use leadbook_shared::geocode::GeocodeResult;
use serde::Deserialize;

/// Address to look up
#[derive(Debug, Deserialize)]
pub struct GeocodeRequest {
    /// Free text; trimmed before lookup and caching
    #[serde(default)]
    pub address: String,
}

/// Resolve an address to coordinates
///
/// # Errors
///
/// - `404 Not Found`: No match
/// - `422 Unprocessable Entity`: Empty or oversized address
/// - `502 Bad Gateway`: Provider failed
pub async fn geocode_address(
    State(state): State<AppState>,
    Json(req): Json<GeocodeRequest>,
) -> ApiResult<Json<GeocodeResult>> {
    let result = state.geocoder.geocode(&req.address).await?;
    Ok(Json(result))
}
