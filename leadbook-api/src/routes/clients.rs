/// Client (contact) endpoints
///
/// All handlers are scoped to the authenticated owner; another owner's client
/// IDs answer `404`.
///
/// # Endpoints
///
/// - `GET /v1/clients?status=&tag=&q=&limit=&offset=` - List
/// - `POST /v1/clients` - Create
/// - `GET /v1/clients/:id` - Fetch
/// - `PATCH /v1/clients/:id` - Partial update (`null` clears a field)
/// - `DELETE /v1/clients/:id` - Delete
/// - `POST /v1/clients/:id/geocode` - Geocode the address and store lat/lon

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{double_option, non_blank},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use leadbook_shared::{
    auth::authorization::AuthContext,
    geocode::GeocodeResult,
    models::client::{Client, ClientFilter, ClientStatus, CreateClient, TagsInput, UpdateClient},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

/// Contact fields accepted on create and on lead intake
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ClientFields {
    #[serde(default)]
    #[validate(length(max = 128, message = "First name must be at most 128 characters"))]
    pub first_name: String,

    #[serde(default)]
    #[validate(length(max = 128, message = "Last name must be at most 128 characters"))]
    pub last_name: String,

    #[validate(length(max = 255, message = "Company must be at most 255 characters"))]
    pub company: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(max = 64, message = "Phone must be at most 64 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 512, message = "Address must be at most 512 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 128, message = "City must be at most 128 characters"))]
    pub city: Option<String>,

    #[validate(length(max = 128, message = "Region must be at most 128 characters"))]
    pub region: Option<String>,

    #[validate(length(max = 32, message = "Postal code must be at most 32 characters"))]
    pub postal_code: Option<String>,

    #[validate(length(max = 64, message = "Country must be at most 64 characters"))]
    pub country: Option<String>,

    pub notes: Option<String>,

    /// Array or delimited string
    #[serde(default)]
    pub tags: TagsInput,

    pub status: Option<ClientStatus>,

    #[validate(length(max = 64, message = "Lead source must be at most 64 characters"))]
    pub lead_source: Option<String>,
}

impl ClientFields {
    /// Validates and converts into a model insert for `owner_id`
    ///
    /// A client needs at least a name, a company or an email.
    pub fn into_create(self, owner_id: Uuid) -> ApiResult<CreateClient> {
        self.validate()?;

        let company = non_blank(self.company);
        let email = non_blank(self.email);

        if self.first_name.trim().is_empty()
            && self.last_name.trim().is_empty()
            && company.is_none()
            && email.is_none()
        {
            return Err(ApiError::invalid(
                "first_name",
                "A name, company or email is required",
            ));
        }

        Ok(CreateClient {
            owner_id,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            company,
            email,
            phone: non_blank(self.phone),
            address: non_blank(self.address),
            city: non_blank(self.city),
            region: non_blank(self.region),
            postal_code: non_blank(self.postal_code),
            country: non_blank(self.country),
            notes: non_blank(self.notes),
            tags: self.tags.normalize(),
            status: self.status,
            lead_source: non_blank(self.lead_source),
        })
    }
}

/// Partial update body
///
/// Omitted fields are left alone. For optional fields `null` or a blank
/// string clears the stored value. Length limits match `ClientFields`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(max = 128, message = "First name must be at most 128 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 128, message = "Last name must be at most 128 characters"))]
    pub last_name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "Company must be at most 255 characters"))]
    pub company: Option<Option<String>>,

    /// Checked in [`UpdateClientRequest::into_update`], where blank means clear
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 64, message = "Phone must be at most 64 characters"))]
    pub phone: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 512, message = "Address must be at most 512 characters"))]
    pub address: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 128, message = "City must be at most 128 characters"))]
    pub city: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 128, message = "Region must be at most 128 characters"))]
    pub region: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 32, message = "Postal code must be at most 32 characters"))]
    pub postal_code: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 64, message = "Country must be at most 64 characters"))]
    pub country: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,

    pub tags: Option<TagsInput>,
    pub status: Option<ClientStatus>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 64, message = "Lead source must be at most 64 characters"))]
    pub lead_source: Option<Option<String>>,
}

impl UpdateClientRequest {
    fn into_update(self) -> ApiResult<UpdateClient> {
        self.validate()?;

        if let Some(Some(email)) = &self.email {
            let email = email.trim();
            if !email.is_empty() && !email.validate_email() {
                return Err(ApiError::invalid("email", "Invalid email format"));
            }
        }

        let clear_blank = |v: Option<Option<String>>| v.map(non_blank);

        Ok(UpdateClient {
            first_name: self.first_name.map(|v| v.trim().to_string()),
            last_name: self.last_name.map(|v| v.trim().to_string()),
            company: clear_blank(self.company),
            email: clear_blank(self.email),
            phone: clear_blank(self.phone),
            address: clear_blank(self.address),
            city: clear_blank(self.city),
            region: clear_blank(self.region),
            postal_code: clear_blank(self.postal_code),
            country: clear_blank(self.country),
            notes: clear_blank(self.notes),
            tags: self.tags.map(|t| t.normalize()),
            status: self.status,
            lead_source: clear_blank(self.lead_source),
        })
    }
}

/// Page of clients matching the filters
#[derive(Debug, Serialize)]
pub struct ClientListResponse {
    pub clients: Vec<Client>,
    pub limit: i64,
    pub offset: i64,

    /// All clients of the owner, ignoring filters
    pub total: i64,
}

/// Client after geocoding
#[derive(Debug, Serialize)]
pub struct GeocodedClient {
    /// Client with `lat`, `lon` and `geocoded_at` set
    pub client: Client,

    /// Lookup result; `cached` tells whether the provider was called
    pub geocode: GeocodeResult,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Client not found".to_string())
}

/// List the caller's clients, newest first
///
/// Filters: `status`, `tag` (case-insensitive) and `q` (substring of the
/// names, company or email).
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<ClientFilter>,
) -> ApiResult<Json<ClientListResponse>> {
    let clients = Client::list(&state.db, auth.user_id, &filter).await?;
    let total = Client::count(&state.db, auth.user_id).await?;

    Ok(Json(ClientListResponse {
        clients,
        limit: filter.limit(),
        offset: filter.offset(),
        total,
    }))
}

/// Create a client
///
/// Names are trimmed, blank optional fields become `null` and tags are
/// deduplicated case-insensitively.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: No name, company or email; bad email;
///   a field longer than its column
pub async fn create_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ClientFields>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let client = Client::create(&state.db, req.into_create(auth.user_id)?).await?;

    tracing::debug!(client_id = %client.id, owner_id = %auth.user_id, "Client created");

    Ok((StatusCode::CREATED, Json(client)))
}

/// Fetch one client
///
/// # Errors
///
/// - `404 Not Found`: Unknown id or another owner's client
pub async fn get_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Client>> {
    let client = Client::find(&state.db, auth.user_id, id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(client))
}

/// Partial update; changing any address field clears stored coordinates
pub async fn update_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> ApiResult<Json<Client>> {
    let client = Client::update(&state.db, auth.user_id, id, req.into_update()?)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(client))
}

/// Delete a client; queued sends keep their copy of the address
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Client::delete(&state.db, auth.user_id, id).await? {
        return Err(not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Geocode a client's address and store the coordinates
///
/// # Errors
///
/// - `404 Not Found`: Unknown client, or the address has no match
/// - `422 Unprocessable Entity`: Client has no address
/// - `502 Bad Gateway`: Geocoding provider failed
pub async fn geocode_client(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GeocodedClient>> {
    let client = Client::find(&state.db, auth.user_id, id)
        .await?
        .ok_or_else(not_found)?;

    let query = client.geocode_query();
    if query.is_empty() {
        return Err(ApiError::invalid("address", "Client has no address to geocode"));
    }

    let geocode = state.geocoder.geocode(&query).await?;

    let client = Client::set_coordinates(&state.db, auth.user_id, id, geocode.lat, geocode.lon)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(GeocodedClient { client, geocode }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_identity() {
        let err = ClientFields::default().into_create(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let ok = ClientFields {
            company: Some("  Acme  ".to_string()),
            ..Default::default()
        }
        .into_create(Uuid::new_v4())
        .unwrap();
        assert_eq!(ok.company.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_create_normalizes_delimited_tags() {
        let fields: ClientFields = serde_json::from_str(
            r#"{"first_name": "Ada", "tags": "vip; VIP | spring-promo"}"#,
        )
        .unwrap();

        let create = fields.into_create(Uuid::new_v4()).unwrap();
        assert_eq!(create.tags, vec!["vip", "spring-promo"]);
    }

    #[test]
    fn test_create_rejects_bad_email() {
        let fields = ClientFields {
            first_name: "Ada".to_string(),
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(fields.into_create(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_update_blank_clears() {
        let req: UpdateClientRequest =
            serde_json::from_str(r#"{"company": "  ", "notes": null, "tags": ["a", "A"]}"#).unwrap();
        let update = req.into_update().unwrap();

        assert_eq!(update.company, Some(None));
        assert_eq!(update.notes, Some(None));
        assert_eq!(update.city, None);
        assert_eq!(update.tags, Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_create_rejects_overlong_address_parts() {
        let fields = ClientFields {
            first_name: "Ada".to_string(),
            postal_code: Some("9".repeat(33)),
            ..Default::default()
        };
        assert!(matches!(
            fields.into_create(Uuid::new_v4()),
            Err(ApiError::ValidationError(_))
        ));

        let fields = ClientFields {
            first_name: "Ada".to_string(),
            country: Some("x".repeat(65)),
            ..Default::default()
        };
        assert!(fields.into_create(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_update_enforces_column_lengths() {
        let req: UpdateClientRequest =
            serde_json::from_value(serde_json::json!({ "city": "c".repeat(129) })).unwrap();
        assert!(matches!(req.into_update(), Err(ApiError::ValidationError(_))));

        let req: UpdateClientRequest =
            serde_json::from_value(serde_json::json!({ "first_name": "n".repeat(129) })).unwrap();
        assert!(req.into_update().is_err());

        let req: UpdateClientRequest =
            serde_json::from_value(serde_json::json!({ "city": "c".repeat(128) })).unwrap();
        assert!(req.into_update().is_ok());
    }

    #[test]
    fn test_update_email_uses_full_check() {
        let req: UpdateClientRequest = serde_json::from_str(r#"{"email": "a@"}"#).unwrap();
        assert!(matches!(req.into_update(), Err(ApiError::ValidationError(_))));

        let req: UpdateClientRequest = serde_json::from_str(r#"{"email": " ada@example.com "}"#).unwrap();
        let update = req.into_update().unwrap();
        assert_eq!(update.email, Some(Some("ada@example.com".to_string())));

        let req: UpdateClientRequest = serde_json::from_str(r#"{"email": ""}"#).unwrap();
        assert_eq!(req.into_update().unwrap().email, Some(None));
    }
}
