/// Owner settings: company profile, sender identity, SMTP transport and lead key
///
/// # Endpoints
///
/// - `GET /v1/settings` - Current settings (never includes the SMTP password)
/// - `PUT /v1/settings` - Partial update
/// - `POST /v1/settings/lead-key` - Rotate the lead key (plaintext returned once)
/// - `POST /v1/settings/test-email` - Queue a test message to the caller
///
/// The SMTP password is sealed with AES-256-GCM before it is stored. An empty
/// string or `null` clears it; omitting the field leaves it unchanged.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{double_option, email::sending_identity},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use leadbook_shared::{
    auth::{
        authorization::AuthContext,
        token::{display_prefix, generate_token, hash_token, TokenKind},
    },
    crypto::SecretBox,
    models::{
        app_settings::{AppSettings, PublicSettings, UpdateAppSettings},
        email_send::{EmailSend, NewEmailSend, SendKind},
    },
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail};

/// Partial settings update
///
/// Omitted fields are left alone; `null` or a blank string clears one.
/// Length limits mirror the `app_settings` columns.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "Company name must be at most 255 characters"))]
    pub company_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 512, message = "Logo URL must be at most 512 characters"))]
    pub logo_url: Option<Option<String>>,

    /// CSS color, e.g. `#1f6feb`
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 16, message = "Primary color must be at most 16 characters"))]
    pub primary_color: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "From name must be at most 255 characters"))]
    pub from_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "From email must be at most 255 characters"))]
    pub from_email: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "Reply-to must be at most 255 characters"))]
    pub reply_to: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "SMTP host must be at most 255 characters"))]
    pub smtp_host: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub smtp_port: Option<Option<i32>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 255, message = "SMTP username must be at most 255 characters"))]
    pub smtp_username: Option<Option<String>>,

    /// Plaintext; sealed before storage
    #[serde(default, deserialize_with = "double_option")]
    pub smtp_password: Option<Option<String>>,

    pub smtp_secure: Option<bool>,
}

fn blank_to_null(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn check_address(field: &str, value: &Option<Option<String>>) -> ApiResult<()> {
    match value {
        Some(Some(address)) if !address.validate_email() => {
            Err(ApiError::invalid(field, "Invalid email format"))
        }
        _ => Ok(()),
    }
}

impl UpdateSettingsRequest {
    fn into_update(self, secrets: &SecretBox) -> ApiResult<UpdateAppSettings> {
        self.validate()?;

        let from_email = blank_to_null(self.from_email);
        let reply_to = blank_to_null(self.reply_to);
        check_address("from_email", &from_email)?;
        check_address("reply_to", &reply_to)?;

        if let Some(Some(port)) = self.smtp_port {
            if !(1..=65535).contains(&port) {
                return Err(ApiError::invalid("smtp_port", "Port must be between 1 and 65535"));
            }
        }

        let smtp_password_encrypted = match self.smtp_password {
            None => None,
            Some(None) => Some(None),
            Some(Some(password)) if password.is_empty() => Some(None),
            Some(Some(password)) => Some(Some(secrets.encrypt(&password)?)),
        };

        Ok(UpdateAppSettings {
            company_name: blank_to_null(self.company_name),
            logo_url: blank_to_null(self.logo_url),
            primary_color: blank_to_null(self.primary_color),
            from_name: blank_to_null(self.from_name),
            from_email,
            reply_to,
            smtp_host: blank_to_null(self.smtp_host),
            smtp_port: self.smtp_port,
            smtp_username: blank_to_null(self.smtp_username),
            smtp_password_encrypted,
            smtp_secure: self.smtp_secure,
        })
    }
}

/// Freshly rotated lead key
#[derive(Debug, Serialize)]
pub struct LeadKeyResponse {
    /// Shown once; only the digest is kept
    pub lead_key: String,

    /// First characters of the key, stored for display
    pub prefix: String,
}

/// Queued test message
#[derive(Debug, Serialize)]
pub struct TestEmailResponse {
    pub send_id: uuid::Uuid,

    /// The caller's own address
    pub to: String,
}

/// Current settings, defaults when none are saved yet
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<PublicSettings>> {
    let settings = AppSettings::get_or_default(&state.db, auth.user_id).await?;
    Ok(Json(settings.to_public()))
}

/// Partially update settings
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Bad sender address, port outside
///   1-65535, or a value longer than its column
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<PublicSettings>> {
    let update = req.into_update(&state.secrets)?;
    let settings = AppSettings::upsert(&state.db, auth.user_id, update).await?;

    tracing::info!(owner_id = %auth.user_id, "Settings updated");

    Ok(Json(settings.to_public()))
}

/// Generate a new lead key, invalidating the previous one
pub async fn rotate_lead_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<(StatusCode, Json<LeadKeyResponse>)> {
    let lead_key = generate_token(TokenKind::LeadKey);
    let prefix = display_prefix(&lead_key);

    AppSettings::set_lead_key(
        &state.db,
        auth.user_id,
        &prefix,
        &hash_token(&lead_key, state.token_secret()),
    )
    .await?;

    tracing::info!(owner_id = %auth.user_id, prefix = %prefix, "Lead key rotated");

    Ok((StatusCode::CREATED, Json(LeadKeyResponse { lead_key, prefix })))
}

/// Queue a test message to the caller through their configured transport
///
/// # Errors
///
/// - `400 Bad Request`: Transport or sender not configured
pub async fn send_test_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<(StatusCode, Json<TestEmailResponse>)> {
    let (settings, sender) = sending_identity(&state, auth.user_id).await?;

    let company = settings
        .company_name
        .clone()
        .unwrap_or_else(|| "Leadbook".to_string());

    let send = EmailSend::enqueue(
        &state.db,
        NewEmailSend {
            owner_id: Some(auth.user_id),
            template_id: None,
            client_id: None,
            kind: SendKind::Single,
            to_addresses: vec![auth.email.clone()],
            bcc_addresses: Vec::new(),
            subject: format!("{} test email", company),
            body_html: format!(
                "<p>This is a test message from {}.</p><p>Sent via {} as {}.</p>",
                company,
                settings.smtp_host.as_deref().unwrap_or_default(),
                sender.email
            ),
            body_text: Some(format!("This is a test message from {}.", company)),
        },
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TestEmailResponse {
            send_id: send.id,
            to: auth.email,
        }),
    ))
}
