/// Platform administration
///
/// Requires an admin caller (allowlisted email or admin metadata).
///
/// # Endpoints
///
/// - `GET /v1/admin/users?limit=&offset=` - Users with their license state
/// - `PUT /v1/admin/users/:id/license` - Record a new license for a user
/// - `GET /v1/admin/audit?user_id=&limit=&offset=` - Audit log, newest first

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ClientMeta,
    routes::Pagination,
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use leadbook_shared::{
    auth::authorization::{is_admin, AuthContext},
    models::{
        audit_log::{AuditEvent, AuditLog},
        license::{evaluate_access, CreateLicense, License, LicenseAccess, LicensePlan, LicenseStatus},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// One row of the users table
#[derive(Debug, Serialize)]
pub struct AdminUserView {
    pub user: User,
    pub is_admin: bool,
    pub license: Option<License>,
    pub access: LicenseAccess,
}

/// Page of users
#[derive(Debug, Serialize)]
pub struct AdminUserList {
    pub users: Vec<AdminUserView>,

    /// All registered users
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// New license for a user
///
/// `expires_at` wins over `expires_in_days`; with neither the license does
/// not expire.
#[derive(Debug, Deserialize)]
pub struct SetLicenseRequest {
    /// Stored status; `inactive` or `expired` revokes access
    pub status: LicenseStatus,

    pub plan: LicensePlan,

    /// Absolute expiry (ISO 8601)
    pub expires_at: Option<DateTime<Utc>>,

    /// Relative expiry; must be positive
    pub expires_in_days: Option<i64>,
}

impl SetLicenseRequest {
    fn expiry(&self, now: DateTime<Utc>) -> ApiResult<Option<DateTime<Utc>>> {
        if let Some(at) = self.expires_at {
            return Ok(Some(at));
        }

        match self.expires_in_days {
            Some(days) if days <= 0 => Err(ApiError::invalid(
                "expires_in_days",
                "expires_in_days must be positive",
            )),
            Some(days) => Ok(Some(now + Duration::days(days))),
            None => Ok(None),
        }
    }
}

/// License update result
#[derive(Debug, Serialize)]
pub struct SetLicenseResponse {
    /// The user's current license after the update
    pub license: License,

    /// Gate decision for that license
    pub access: LicenseAccess,
}

/// Audit log filters
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// Only entries about this user
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List users with their current license and gate decision
///
/// Default page size 50, at most 200.
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<AdminUserList>> {
    let limit = page.limit_or(50, 200);
    let offset = page.offset();
    let now = Utc::now();

    let users = User::list(&state.db, limit, offset).await?;
    let total = User::count(&state.db).await?;

    let mut views = Vec::with_capacity(users.len());
    for user in users {
        let license = License::current_for_user(&state.db, user.id).await?;
        let admin = is_admin(&user, &state.config.auth.admin_emails);

        views.push(AdminUserView {
            access: evaluate_access(license.as_ref(), now, admin),
            is_admin: admin,
            license,
            user,
        });
    }

    Ok(Json(AdminUserList {
        users: views,
        total,
        limit,
        offset,
    }))
}

/// Replace a user's license; earlier rows are superseded so the new one is
/// current even when an older row expires later
///
/// The response reports the license the gate will consult next, so it
/// always agrees with `402` decisions on the user's following request.
///
/// # Errors
///
/// - `404 Not Found`: Unknown user
/// - `422 Unprocessable Entity`: Non-positive `expires_in_days`
pub async fn set_user_license(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ClientMeta(meta): ClientMeta,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetLicenseRequest>,
) -> ApiResult<Json<SetLicenseResponse>> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let now = Utc::now();
    let expires_at = req.expiry(now)?;

    License::replace_for_user(
        &state.db,
        CreateLicense {
            user_id: user.id,
            status: req.status,
            plan: req.plan,
            expires_at,
        },
    )
    .await?;

    AuditLog::record(
        &state.db,
        AuditEvent::LicenseUpdated,
        Some(user.id),
        Some(&user.email),
        &meta,
        json!({
            "admin_id": auth.user_id,
            "status": req.status.as_str(),
            "plan": req.plan.as_str(),
            "expires_at": expires_at,
        }),
    )
    .await;

    tracing::info!(
        admin_id = %auth.user_id,
        user_id = %user.id,
        status = req.status.as_str(),
        plan = req.plan.as_str(),
        "License updated"
    );

    let license = License::current_for_user(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::InternalError("License missing after update".to_string()))?;

    let access = evaluate_access(
        Some(&license),
        now,
        is_admin(&user, &state.config.auth.admin_emails),
    );

    Ok(Json(SetLicenseResponse { license, access }))
}

/// Audit entries, newest first (default 100, at most 500)
pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };

    let entries = AuditLog::list_recent(
        &state.db,
        query.user_id,
        page.limit_or(100, 500),
        page.offset(),
    )
    .await?;

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(expires_at: Option<DateTime<Utc>>, days: Option<i64>) -> SetLicenseRequest {
        SetLicenseRequest {
            status: LicenseStatus::Active,
            plan: LicensePlan::Pro,
            expires_at,
            expires_in_days: days,
        }
    }

    #[test]
    fn test_expiry_from_days() {
        let now = Utc::now();
        assert_eq!(
            request(None, Some(30)).expiry(now).unwrap(),
            Some(now + Duration::days(30))
        );
        assert_eq!(request(None, None).expiry(now).unwrap(), None);
    }

    #[test]
    fn test_explicit_expiry_wins() {
        let now = Utc::now();
        let at = now + Duration::days(3);
        assert_eq!(request(Some(at), Some(30)).expiry(now).unwrap(), Some(at));
    }

    #[test]
    fn test_non_positive_days_rejected() {
        assert!(request(None, Some(0)).expiry(Utc::now()).is_err());
    }

    #[test]
    fn test_request_parses_lowercase_enums() {
        let req: SetLicenseRequest =
            serde_json::from_str(r#"{"status": "active", "plan": "basic", "expires_in_days": 365}"#)
                .unwrap();
        assert_eq!(req.status, LicenseStatus::Active);
        assert_eq!(req.plan, LicensePlan::Basic);
    }
}
