/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers should return `Result<T, ApiError>` which automatically
/// converts to appropriate HTTP status codes.
///
/// # Example
///
/// ```
/// use leadbook_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Err(ApiError::NotFound("Client not found".to_string()))
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use leadbook_shared::{
    auth::{
        authorization::AuthzError, password::PasswordError, reset::ResetError,
        session::SessionError,
    },
    booking::BookingError,
    crypto::CryptoError,
    email::transport::MailError,
    geocode::GeocodeError,
    models::email_template,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// License missing, inactive or expired (402)
    LicenseRequired(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Upstream service failed (502)
    BadGateway(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::LicenseRequired(msg) => write!(f, "License required: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::BadGateway(msg) => write!(f, "Upstream error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::RateLimitExceeded { retry_after, message } = self {
            let body = Json(ErrorResponse {
                error: "rate_limit_exceeded".to_string(),
                message,
                details: None,
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            return response;
        }

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::LicenseRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "license_required", msg, None)
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::RateLimitExceeded { message, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", message, None)
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "upstream_error", msg, None)
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Postgres `string_data_right_truncation`
const VALUE_TOO_LONG: &str = "22001";

/// Maps a database constraint failure to a client error
///
/// Messages never carry constraint or table names.
fn constraint_error(
    kind: sqlx::error::ErrorKind,
    constraint: Option<&str>,
    code: Option<&str>,
) -> Option<ApiError> {
    use sqlx::error::ErrorKind;

    match kind {
        ErrorKind::UniqueViolation if constraint == Some("users_email_key") => {
            Some(ApiError::Conflict("Email already exists".to_string()))
        }
        ErrorKind::UniqueViolation => {
            Some(ApiError::Conflict("Resource already exists".to_string()))
        }
        ErrorKind::ForeignKeyViolation => Some(ApiError::BadRequest(
            "Referenced resource does not exist".to_string(),
        )),
        ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
            Some(ApiError::BadRequest("Invalid value".to_string()))
        }
        _ if code == Some(VALUE_TOO_LONG) => {
            Some(ApiError::BadRequest("Value too long".to_string()))
        }
        _ => None,
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if email_template::is_duplicate_name(&err) {
            return ApiError::Conflict("A template with this name already exists".to_string());
        }

        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                if let Some(mapped) =
                    constraint_error(db_err.kind(), db_err.constraint(), code.as_deref())
                {
                    tracing::debug!(
                        constraint = db_err.constraint(),
                        error = %db_err,
                        "Database constraint rejected request"
                    );
                    return mapped;
                }

                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert `validator` derive failures into per-field details
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(errors)
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Invalid => ApiError::Unauthorized("Invalid session token".to_string()),
            SessionError::Expired => ApiError::Unauthorized("Session expired".to_string()),
            SessionError::RefreshRejected => {
                ApiError::Unauthorized("Invalid or expired refresh token".to_string())
            }
            SessionError::UserNotFound => ApiError::Unauthorized("User not found".to_string()),
            SessionError::Database(e) => e.into(),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotAdmin => ApiError::Forbidden("Admin access required".to_string()),
        }
    }
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::InvalidToken => {
                ApiError::BadRequest("Invalid or expired reset token".to_string())
            }
            ResetError::WeakPassword(msg) => ApiError::invalid("new_password", msg),
            ResetError::Password(e) => e.into(),
            ResetError::Database(e) => e.into(),
        }
    }
}

impl From<GeocodeError> for ApiError {
    fn from(err: GeocodeError) -> Self {
        match err {
            GeocodeError::InvalidAddress(msg) => ApiError::invalid("address", msg),
            GeocodeError::NotFound => {
                ApiError::NotFound("No location found for address".to_string())
            }
            GeocodeError::Provider(msg) => ApiError::BadGateway(msg),
            GeocodeError::Database(e) => e.into(),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        ApiError::InternalError(format!("Secret handling failed: {}", err))
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Invalid(msg) => ApiError::invalid("booking", msg),
            BookingError::Render(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::InvalidAddress(msg) => ApiError::invalid("email", msg),
            MailError::NotConfigured => {
                ApiError::BadRequest("Email transport is not configured".to_string())
            }
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Client not found".to_string());
        assert_eq!(err.to_string(), "Not found: Client not found");
    }

    #[test]
    fn test_foreign_key_violation_hides_constraint() {
        use sqlx::error::ErrorKind;

        let err = constraint_error(
            ErrorKind::ForeignKeyViolation,
            Some("email_sends_template_id_fkey"),
            Some("23503"),
        )
        .unwrap();

        let message = err.to_string();
        assert!(!message.contains("fkey"));
        assert!(!message.contains("email_sends"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_constraint_mapping() {
        use sqlx::error::ErrorKind;

        let err = constraint_error(ErrorKind::UniqueViolation, Some("users_email_key"), None).unwrap();
        assert!(matches!(err, ApiError::Conflict(ref m) if m == "Email already exists"));

        let err = constraint_error(ErrorKind::CheckViolation, Some("clients_status_check"), None).unwrap();
        assert!(matches!(err, ApiError::BadRequest(ref m) if !m.contains("clients_status_check")));

        let err = constraint_error(ErrorKind::Other, None, Some("22001")).unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        assert!(constraint_error(ErrorKind::Other, None, Some("40001")).is_none());
    }

    #[test]
    fn test_validation_error() {
        let errors = vec![
            ValidationErrorDetail {
                field: "email".to_string(),
                message: "Invalid email format".to_string(),
            },
            ValidationErrorDetail {
                field: "password".to_string(),
                message: "Password too short".to_string(),
            },
        ];

        let err = ApiError::ValidationError(errors);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::LicenseRequired("x".into()), StatusCode::PAYMENT_REQUIRED),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApiError::invalid("name", "required"), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::BadGateway("x".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: 12,
            message: "slow down".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "12");
    }

    #[test]
    fn test_session_errors_are_unauthorized() {
        let err: ApiError = SessionError::Expired.into();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_geocode_not_found() {
        let err: ApiError = GeocodeError::NotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
