/// Health check endpoint
///
/// Verifies the server is running and reports database and Redis
/// connectivity plus the email queue depth.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "database_latency_ms": 1,
///   "pool": { "size": 2, "idle": 2, "in_use": 0, "max": 10 },
///   "redis": "connected",
///   "queued_emails": 0
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use leadbook_shared::{
    db::pool::{ping, pool_stats, PoolStats},
    models::email_send::EmailSend,
};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    pub version: String,
    pub database: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_latency_ms: Option<u64>,

    pub pool: PoolStats,
    pub redis: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_emails: Option<i64>,
}

fn connectivity(ok: bool) -> &'static str {
    if ok {
        "connected"
    } else {
        "disconnected"
    }
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let latency = ping(&state.db).await.ok();
    let database_ok = latency.is_some();
    let redis_ok = state.redis.ping().await.unwrap_or(false);

    let queued_emails = if database_ok {
        EmailSend::count_queued(&state.db).await.ok()
    } else {
        None
    };

    Ok(Json(HealthResponse {
        status: if database_ok && redis_ok {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: connectivity(database_ok).to_string(),
        database_latency_ms: latency.map(|d| d.as_millis() as u64),
        pool: pool_stats(&state.db),
        redis: connectivity(redis_ok).to_string(),
        queued_emails,
    }))
}
