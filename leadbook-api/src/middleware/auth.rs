/// Session, license and admin gates
///
/// Layer order on a gated router (outermost first):
///
/// 1. [`session_auth_layer`] verifies the bearer token and inserts
///    [`AuthContext`] and the [`User`] into request extensions
/// 2. [`license_gate_layer`] evaluates the caller's current license and
///    inserts the resulting [`LicenseAccess`]
/// 3. [`admin_layer`] rejects non-admins
///
/// Axum applies `.layer()` calls inside-out, so routers list them in reverse.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Extension, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use leadbook_shared::{
    auth::{
        authorization::{require_admin, AuthContext},
        token::bearer_from_header,
    },
    models::{
        license::{evaluate_access, AccessReason, License},
        user::User,
    },
};

/// Bearer session authentication
pub async fn session_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = bearer_from_header(auth_header)
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))?;

    let verified = state.sessions.verify(token).await?;

    let ctx = AuthContext::new(
        verified.session_id,
        &verified.user,
        &state.config.auth.admin_emails,
    );

    req.extensions_mut().insert(ctx);
    req.extensions_mut().insert::<User>(verified.user);

    Ok(next.run(req).await)
}

fn denial_message(reason: AccessReason) -> &'static str {
    match reason {
        AccessReason::NoLicense => "No license found for this account",
        AccessReason::Expired => "Your license has expired",
        _ => "Your license is not active",
    }
}

/// License gate for paid features
pub async fn license_gate_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let license = License::current_for_user(&state.db, auth.user_id).await?;
    let access = evaluate_access(license.as_ref(), Utc::now(), auth.is_admin);

    if !access.granted {
        tracing::info!(
            user_id = %auth.user_id,
            reason = ?access.reason,
            "License gate denied request"
        );
        return Err(ApiError::LicenseRequired(denial_message(access.reason).to_string()));
    }

    req.extensions_mut().insert(access);
    Ok(next.run(req).await)
}

/// Admin-only routes
pub async fn admin_layer(
    Extension(auth): Extension<AuthContext>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_admin(&auth).map_err(|e| {
        tracing::warn!(user_id = %auth.user_id, "Non-admin attempted admin route");
        ApiError::from(e)
    })?;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_messages() {
        assert_eq!(denial_message(AccessReason::Expired), "Your license has expired");
        assert_eq!(
            denial_message(AccessReason::NoLicense),
            "No license found for this account"
        );
        assert_eq!(denial_message(AccessReason::Inactive), "Your license is not active");
    }
}
