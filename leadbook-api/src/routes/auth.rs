/// Authentication endpoints
///
/// # Endpoints
///
/// Public (rate limited per client IP):
/// - `POST /v1/auth/signup` - Create account, start trial, open session
/// - `POST /v1/auth/login` - Open session
/// - `POST /v1/auth/refresh` - Rotate session tokens
/// - `POST /v1/auth/password-reset/request` - Email a reset link
/// - `POST /v1/auth/password-reset/confirm` - Set a new password with a reset token
///
/// Session-authenticated:
/// - `POST /v1/auth/logout` - Revoke the current session
/// - `GET /v1/auth/me` - Profile, admin flag and license state
/// - `PATCH /v1/auth/me` - Update email or name
/// - `POST /v1/auth/password` - Change password, revoking other sessions

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ClientMeta,
    routes::{double_option, non_blank},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use leadbook_shared::{
    auth::{
        authorization::AuthContext,
        password::{hash_password, needs_rehash, validate_password_strength, verify_password},
        reset,
        session::IssuedSession,
    },
    models::{
        audit_log::{AuditEvent, AuditLog},
        license::{evaluate_access, CreateLicense, License, LicenseAccess, LicensePlan, LicenseStatus},
        user::{CreateUser, UpdateUser, User},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked for strength after the length check
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

/// Login credentials
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Refresh token exchange
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// `lbr_` token from the last login or refresh; single use
    pub refresh_token: String,
}

/// Session plus the user it belongs to
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    #[serde(flatten)]
    pub session: IssuedSession,
}

/// Current user view
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub is_admin: bool,

    /// Gate decision for the current license
    pub license: LicenseAccess,
}

/// Profile update; omitted fields are unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    /// `null` clears the name
    #[serde(default, deserialize_with = "double_option")]
    pub name: Option<Option<String>>,
}

/// Password change for a signed-in user
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,

    /// Checked against the password policy
    pub new_password: String,
}

/// Start of the forgotten-password flow
#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Completion of the forgotten-password flow
#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    /// `lbp_` token from the reset email
    pub token: String,

    pub new_password: String,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn weak_password(field: &str, message: String) -> ApiError {
    ApiError::invalid(field, message)
}

/// Register a new user
///
/// Creates the account, a trial license of `TRIAL_DAYS` and a session.
///
/// # Errors
///
/// - `409 Conflict`: Email already exists
/// - `422 Unprocessable Entity`: Validation failed or weak password
pub async fn signup(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    validate_password_strength(&req.password).map_err(|e| weak_password("password", e))?;

    let password_hash = hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_string(),
            password_hash,
            name: non_blank(req.name),
        },
    )
    .await?;

    License::create(
        &state.db,
        CreateLicense {
            user_id: user.id,
            status: LicenseStatus::Trial,
            plan: LicensePlan::Trial,
            expires_at: Some(Utc::now() + Duration::days(state.config.auth.trial_days)),
        },
    )
    .await?;

    let session = state.sessions.issue(user.id, &meta).await?;

    AuditLog::record(
        &state.db,
        AuditEvent::Signup,
        Some(user.id),
        Some(&user.email),
        &meta,
        json!({ "trial_days": state.config.auth.trial_days }),
    )
    .await;

    tracing::info!(user_id = %user.id, "User signed up");

    Ok((StatusCode::CREATED, Json(AuthResponse { user, session })))
}

/// Login
///
/// Legacy SHA-256 password hashes are accepted and replaced with Argon2id.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let Some(user) = User::find_by_email(&state.db, &req.email).await? else {
        AuditLog::record(
            &state.db,
            AuditEvent::LoginFailed,
            None,
            Some(req.email.trim()),
            &meta,
            json!({ "reason": "unknown_email" }),
        )
        .await;
        return Err(invalid());
    };

    let valid = verify_password(&req.password, &user.password_hash).unwrap_or_else(|e| {
        tracing::warn!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
        false
    });

    if !valid {
        AuditLog::record(
            &state.db,
            AuditEvent::LoginFailed,
            Some(user.id),
            Some(&user.email),
            &meta,
            json!({ "reason": "bad_password" }),
        )
        .await;
        return Err(invalid());
    }

    if needs_rehash(&user.password_hash) {
        match hash_password(&req.password) {
            Ok(upgraded) => {
                User::set_password_hash(&state.db, user.id, &upgraded).await?;
                tracing::info!(user_id = %user.id, "Upgraded legacy password hash");
            }
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "Password rehash failed"),
        }
    }

    User::update_last_login(&state.db, user.id).await?;
    let session = state.sessions.issue(user.id, &meta).await?;

    AuditLog::record(
        &state.db,
        AuditEvent::Login,
        Some(user.id),
        Some(&user.email),
        &meta,
        json!({ "session_id": session.session_id }),
    )
    .await;

    Ok(Json(AuthResponse { user, session }))
}

/// Rotate session tokens
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown, rotated or expired refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<IssuedSession>> {
    let session = state.sessions.refresh(req.refresh_token.trim()).await?;
    Ok(Json(session))
}

/// Revoke the current session
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ClientMeta(meta): ClientMeta,
) -> ApiResult<StatusCode> {
    state.sessions.revoke(auth.session_id).await?;

    AuditLog::record(
        &state.db,
        AuditEvent::Logout,
        Some(auth.user_id),
        Some(&auth.email),
        &meta,
        json!({ "session_id": auth.session_id }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Current user, admin flag and license state
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<MeResponse>> {
    let license = License::current_for_user(&state.db, user.id).await?;

    Ok(Json(MeResponse {
        license: evaluate_access(license.as_ref(), Utc::now(), auth.is_admin),
        is_admin: auth.is_admin,
        user,
    }))
}

/// Update email and/or name
///
/// # Errors
///
/// - `409 Conflict`: Email already in use
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    if let Some(Some(name)) = &req.name {
        if name.chars().count() > 100 {
            return Err(ApiError::invalid("name", "Name must be at most 100 characters"));
        }
    }

    let user = User::update(
        &state.db,
        auth.user_id,
        UpdateUser {
            email: req.email.map(|e| e.trim().to_string()),
            name: req.name.map(non_blank),
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Change password; other sessions are revoked
///
/// # Errors
///
/// - `401 Unauthorized`: Current password is wrong
/// - `422 Unprocessable Entity`: New password too weak
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(user): Extension<User>,
    ClientMeta(meta): ClientMeta,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
    }

    validate_password_strength(&req.new_password).map_err(|e| weak_password("new_password", e))?;

    let password_hash = hash_password(&req.new_password)?;
    User::set_password_hash(&state.db, user.id, &password_hash).await?;

    let revoked = state
        .sessions
        .revoke_all_for_user(user.id, Some(auth.session_id))
        .await?;

    AuditLog::record(
        &state.db,
        AuditEvent::PasswordChanged,
        Some(user.id),
        Some(&user.email),
        &meta,
        json!({ "revoked_sessions": revoked }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Request a password reset email
///
/// Always answers `202` with the same body, whether or not the account exists.
pub async fn request_password_reset(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    Json(req): Json<ResetRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    req.validate()?;

    let requested = reset::request(
        &state.db,
        state.token_secret(),
        &state.config.api.app_base_url,
        req.email.trim(),
    )
    .await?;

    if let Some(requested) = requested {
        AuditLog::record(
            &state.db,
            AuditEvent::PasswordResetRequested,
            Some(requested.user_id),
            Some(req.email.trim()),
            &meta,
            json!({ "send_id": requested.send_id }),
        )
        .await;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If an account exists for this email, a reset link has been sent".to_string(),
        }),
    ))
}

/// Complete a password reset
///
/// # Errors
///
/// - `400 Bad Request`: Unknown, used or expired token
/// - `422 Unprocessable Entity`: New password too weak
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    Json(req): Json<ResetConfirmRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user = reset::confirm(
        &state.db,
        state.token_secret(),
        req.token.trim(),
        &req.new_password,
    )
    .await?;

    AuditLog::record(
        &state.db,
        AuditEvent::PasswordReset,
        Some(user.id),
        Some(&user.email),
        &meta,
        json!({}),
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Password updated. Please log in again".to_string(),
    }))
}
