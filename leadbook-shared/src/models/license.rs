/// License model and access gate
///
/// Each user has a history of license rows. The one consulted is the latest
/// by expiry among rows not yet superseded (a NULL expiry never runs out and
/// therefore sorts first). [`License::replace_for_user`] supersedes every
/// live row before inserting, so an admin downgrade or revoke takes effect
/// even when the old row outlasts the new one.
/// [`evaluate_access`] turns that row into a yes/no decision for the
/// email and settings features.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE licenses (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     status VARCHAR(16) NOT NULL,     -- active | trial | inactive | expired
///     plan VARCHAR(32) NOT NULL DEFAULT 'trial',  -- trial | basic | pro
///     expires_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     superseded_at TIMESTAMPTZ        -- set when an admin replaced the row
/// );
/// ```
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use leadbook_shared::models::license::{evaluate_access, AccessReason};
///
/// let decision = evaluate_access(None, Utc::now(), false);
/// assert!(!decision.granted);
/// assert_eq!(decision.reason, AccessReason::NoLicense);
///
/// let admin = evaluate_access(None, Utc::now(), true);
/// assert!(admin.granted);
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const LICENSE_COLUMNS: &str = "id, user_id, status, plan, expires_at, created_at, superseded_at";

/// License status as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Trial,
    Inactive,
    Expired,
}

impl LicenseStatus {
    /// Converts to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Trial => "trial",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Expired => "expired",
        }
    }

    /// Parses a stored value; `None` for unknown values
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LicenseStatus::Active),
            "trial" => Some(LicenseStatus::Trial),
            "inactive" => Some(LicenseStatus::Inactive),
            "expired" => Some(LicenseStatus::Expired),
            _ => None,
        }
    }
}

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicensePlan {
    Trial,
    Basic,
    Pro,
}

impl LicensePlan {
    /// Converts to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            LicensePlan::Trial => "trial",
            LicensePlan::Basic => "basic",
            LicensePlan::Pro => "pro",
        }
    }

    /// Parses a stored value; `None` for unknown values
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(LicensePlan::Trial),
            "basic" => Some(LicensePlan::Basic),
            "pro" => Some(LicensePlan::Pro),
            _ => None,
        }
    }
}

/// Stored license row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct License {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Raw status; parse with [`License::get_status`]
    pub status: String,

    /// Raw plan; parse with [`License::get_plan`]
    pub plan: String,

    /// None means the license does not expire
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    /// Set once a later admin update replaced this row; never current again
    pub superseded_at: Option<DateTime<Utc>>,
}

/// Input for recording a new license
#[derive(Debug, Clone)]
pub struct CreateLicense {
    pub user_id: Uuid,
    pub status: LicenseStatus,
    pub plan: LicensePlan,
    pub expires_at: Option<DateTime<Utc>>,
}

impl License {
    /// Parsed stored status, before expiry is applied
    pub fn get_status(&self) -> Option<LicenseStatus> {
        LicenseStatus::from_str(&self.status)
    }

    /// Parsed plan
    pub fn get_plan(&self) -> Option<LicensePlan> {
        LicensePlan::from_str(&self.plan)
    }

    /// Inserts a license row alongside the existing ones
    ///
    /// The row becomes current only if its expiry is the latest among the
    /// user's live rows. Use [`License::replace_for_user`] to force it.
    pub async fn create(pool: &PgPool, data: CreateLicense) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO licenses (user_id, status, plan, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            LICENSE_COLUMNS
        );

        sqlx::query_as::<_, License>(&query)
            .bind(data.user_id)
            .bind(data.status.as_str())
            .bind(data.plan.as_str())
            .bind(data.expires_at)
            .fetch_one(pool)
            .await
    }

    /// Supersedes the user's live rows and inserts `data` in one transaction
    ///
    /// The inserted row is the only live row afterwards, so it is current.
    pub async fn replace_for_user(pool: &PgPool, data: CreateLicense) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let superseded = sqlx::query(
            "UPDATE licenses SET superseded_at = NOW() \
             WHERE user_id = $1 AND superseded_at IS NULL",
        )
        .bind(data.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let query = format!(
            "INSERT INTO licenses (user_id, status, plan, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            LICENSE_COLUMNS
        );

        let license = sqlx::query_as::<_, License>(&query)
            .bind(data.user_id)
            .bind(data.status.as_str())
            .bind(data.plan.as_str())
            .bind(data.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            user_id = %data.user_id,
            license_id = %license.id,
            superseded,
            "License replaced"
        );

        Ok(license)
    }

    /// The license consulted for a user: latest by expiry among live rows,
    /// newest on ties
    pub async fn current_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM licenses
            WHERE user_id = $1 AND superseded_at IS NULL
            ORDER BY expires_at DESC NULLS FIRST, created_at DESC
            LIMIT 1
            "#,
            LICENSE_COLUMNS
        );

        sqlx::query_as::<_, License>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Full license history of a user, superseded rows included, newest first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM licenses WHERE user_id = $1 ORDER BY created_at DESC",
            LICENSE_COLUMNS
        );

        sqlx::query_as::<_, License>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}

/// Why access was granted or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    Admin,
    Licensed,
    NoLicense,
    Expired,
    Inactive,
}

/// Outcome of the license gate
#[derive(Debug, Clone, Serialize)]
pub struct LicenseAccess {
    pub granted: bool,

    /// Status after applying expiry (an active license past its expiry is `expired`)
    pub effective_status: Option<LicenseStatus>,

    pub plan: Option<LicensePlan>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: AccessReason,
}

/// Decides whether a user may use gated features
///
/// Admins always pass. Otherwise the license must be `active` or `trial`
/// and not past its expiry. Unknown status strings are treated as inactive.
pub fn evaluate_access(
    license: Option<&License>,
    now: DateTime<Utc>,
    is_admin: bool,
) -> LicenseAccess {
    let plan = license.and_then(License::get_plan);
    let expires_at = license.and_then(|l| l.expires_at);

    let Some(license) = license else {
        return LicenseAccess {
            granted: is_admin,
            effective_status: None,
            plan: None,
            expires_at: None,
            reason: if is_admin { AccessReason::Admin } else { AccessReason::NoLicense },
        };
    };

    let stored = license.get_status().unwrap_or(LicenseStatus::Inactive);
    let past_expiry = expires_at.map(|at| at <= now).unwrap_or(false);

    let effective_status = match stored {
        LicenseStatus::Active | LicenseStatus::Trial if past_expiry => LicenseStatus::Expired,
        other => other,
    };

    let (granted, reason) = match effective_status {
        LicenseStatus::Active | LicenseStatus::Trial => (true, AccessReason::Licensed),
        LicenseStatus::Expired => (false, AccessReason::Expired),
        LicenseStatus::Inactive => (false, AccessReason::Inactive),
    };

    let (granted, reason) = if is_admin && !granted {
        (true, AccessReason::Admin)
    } else {
        (granted, reason)
    };

    LicenseAccess {
        granted,
        effective_status: Some(effective_status),
        plan,
        expires_at,
        reason,
    }
}
