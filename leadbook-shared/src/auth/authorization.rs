/// Authorization helpers
///
/// Leadbook has two roles: regular owners and platform admins. A user is an
/// admin when any of these hold:
///
/// 1. Their email is in the configured allowlist (case-insensitive)
/// 2. `metadata.is_admin` is `true`
/// 3. `metadata.role` is `"admin"`
///
/// # Example
///
/// ```
/// use leadbook_shared::auth::authorization::is_admin_email;
///
/// let allowlist = vec!["boss@example.com".to_string()];
/// assert!(is_admin_email("Boss@Example.com", &allowlist));
/// assert!(!is_admin_email("staff@example.com", &allowlist));
/// ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::user::User;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Caller is not an admin
    #[error("Admin access required")]
    NotAdmin,
}

/// Authenticated caller, attached to each session-authenticated request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

impl AuthContext {
    /// Builds the context for a verified session
    pub fn new(session_id: Uuid, user: &User, admin_emails: &[String]) -> Self {
        Self {
            session_id,
            user_id: user.id,
            email: user.email.clone(),
            is_admin: is_admin(user, admin_emails),
        }
    }
}

/// Whether `email` appears in the allowlist, ignoring case and whitespace
pub fn is_admin_email(email: &str, allowlist: &[String]) -> bool {
    let email = email.trim();
    !email.is_empty()
        && allowlist
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(email))
}

/// Whether the metadata grants admin rights
pub fn is_admin_metadata(metadata: &JsonValue) -> bool {
    metadata.get("is_admin").and_then(JsonValue::as_bool) == Some(true)
        || metadata.get("role").and_then(JsonValue::as_str) == Some("admin")
}

/// Whether a user is a platform admin
pub fn is_admin(user: &User, allowlist: &[String]) -> bool {
    is_admin_email(&user.email, allowlist) || is_admin_metadata(&user.metadata)
}

/// Fails unless the caller is an admin
pub fn require_admin(ctx: &AuthContext) -> Result<(), AuthzError> {
    if ctx.is_admin {
        Ok(())
    } else {
        Err(AuthzError::NotAdmin)
    }
}

/// Parses a comma-separated allowlist (the `ADMIN_EMAILS` format)
pub fn parse_allowlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
