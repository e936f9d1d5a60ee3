/// Public lead intake
///
/// External forms post contacts with the owner's lead key in `X-Api-Key`.
/// The key is matched by its HMAC digest; the plaintext is never stored.
///
/// # Endpoint
///
/// ```text
/// POST /v1/leads
/// X-Api-Key: lbk_...
/// ```
///
/// The created client always has status `lead`; `lead_source` defaults to
/// `api`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::clients::ClientFields,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use leadbook_shared::{
    auth::token::{hash_token, validate_token_format, TokenKind},
    models::{
        app_settings::AppSettings,
        client::{Client, ClientStatus},
    },
};
use uuid::Uuid;

/// Header carrying the lead key
pub const LEAD_KEY_HEADER: &str = "x-api-key";

/// Default `lead_source` for intake without one
pub const DEFAULT_LEAD_SOURCE: &str = "api";

async fn resolve_owner(state: &AppState, headers: &HeaderMap) -> ApiResult<Uuid> {
    let invalid = || ApiError::Unauthorized("Invalid or missing lead key".to_string());

    let key = headers
        .get(LEAD_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or_else(invalid)?;

    if !validate_token_format(key, TokenKind::LeadKey) {
        return Err(invalid());
    }

    AppSettings::find_owner_by_lead_key(&state.db, &hash_token(key, state.token_secret()))
        .await?
        .ok_or_else(invalid)
}

/// Create a lead
///
/// # Errors
///
/// - `401 Unauthorized`: Missing, malformed or unknown lead key
/// - `422 Unprocessable Entity`: Validation failed
/// - `429 Too Many Requests`: Intake rate limit exceeded
pub async fn create_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut fields): Json<ClientFields>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let owner_id = resolve_owner(&state, &headers).await?;

    fields.status = Some(ClientStatus::Lead);
    if fields
        .lead_source
        .as_deref()
        .map_or(true, |s| s.trim().is_empty())
    {
        fields.lead_source = Some(DEFAULT_LEAD_SOURCE.to_string());
    }

    let client = Client::create(&state.db, fields.into_create(owner_id)?).await?;

    tracing::info!(
        client_id = %client.id,
        owner_id = %owner_id,
        lead_source = client.lead_source.as_deref().unwrap_or(DEFAULT_LEAD_SOURCE),
        "Lead received"
    );

    Ok((StatusCode::CREATED, Json(client)))
}
