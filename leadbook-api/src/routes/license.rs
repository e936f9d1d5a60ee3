/// `GET /v1/license`: the caller's current license and whether it grants access

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use leadbook_shared::{
    auth::authorization::AuthContext,
    models::license::{evaluate_access, License, LicenseAccess},
};
use serde::Serialize;

/// Caller's license state
#[derive(Debug, Serialize)]
pub struct LicenseResponse {
    /// Stored row, if any
    pub license: Option<License>,
    pub access: LicenseAccess,
}

/// The license the gate consults for the caller and its decision
///
/// Never gated itself, so an unlicensed user can see why access is denied.
pub async fn current_license(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<LicenseResponse>> {
    let license = License::current_for_user(&state.db, auth.user_id).await?;
    let access = evaluate_access(license.as_ref(), Utc::now(), auth.is_admin);

    Ok(Json(LicenseResponse { license, access }))
}
