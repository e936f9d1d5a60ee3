/// Rate limiting middleware
///
/// Applies the Redis token buckets from `leadbook_shared::redis::rate_limit`.
///
/// # Scopes
///
/// - `auth`: public auth endpoints, keyed by client IP
/// - `leads`: public lead intake, keyed by client IP
/// - `email`: send endpoints, keyed by owner, capacity by license plan
///
/// # Headers
///
/// Allowed responses carry:
/// - `X-RateLimit-Limit`: Bucket capacity
/// - `X-RateLimit-Remaining`: Tokens remaining
///
/// Rejections are `429` with `Retry-After` (seconds).
///
/// When Redis is unreachable the request is allowed and a warning is logged.

use crate::{app::AppState, error::ApiError, extract::ClientMeta};
use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use leadbook_shared::{
    auth::authorization::AuthContext,
    models::license::LicenseAccess,
    redis::{RateLimit, RateLimitDecision},
};

async fn enforce(
    state: &AppState,
    scope: &str,
    subject: &str,
    limit: RateLimit,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let decision = match state.rate_limiter.check(scope, subject, limit).await {
        Ok(decision) => Some(decision),
        Err(e) => {
            tracing::warn!(error = %e, scope, "Rate limiter unavailable, allowing request");
            None
        }
    };

    if let Some(RateLimitDecision {
        allowed: false,
        retry_after,
        ..
    }) = decision
    {
        tracing::info!(scope, subject, retry_after, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after,
            message: format!("Rate limit exceeded. Try again in {} seconds", retry_after),
        });
    }

    let mut response = next.run(request).await;

    if let Some(decision) = decision {
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.bucket_capacity));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    }

    Ok(response)
}

/// Per-IP limit for login, signup, refresh and password reset
pub async fn auth_rate_limit_layer(
    State(state): State<AppState>,
    meta: ClientMeta,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, "auth", meta.subject(), RateLimit::auth(), request, next).await
}

/// Per-IP limit for public lead intake
pub async fn lead_rate_limit_layer(
    State(state): State<AppState>,
    meta: ClientMeta,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, "leads", meta.subject(), RateLimit::lead_intake(), request, next).await
}

/// Per-owner limit for email sends; runs after the license gate
pub async fn email_rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(access): Extension<LicenseAccess>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = RateLimit::email_for_plan(access.plan);
    enforce(&state, "email", &auth.user_id.to_string(), limit, request, next).await
}
