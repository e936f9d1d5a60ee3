/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use leadbook_api::{app::{build_router, AppState}, config::Config};
/// use leadbook_shared::redis::{RedisClient, RedisConfig};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let redis = RedisClient::new(RedisConfig::new(config.redis.url.clone())).await?;
/// let state = AppState::new(pool, redis, config)?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        auth::{admin_layer, license_gate_layer, session_auth_layer},
        rate_limit::{auth_rate_limit_layer, email_rate_limit_layer, lead_rate_limit_layer},
        security::SecurityHeadersLayer,
    },
    routes,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use chrono::Duration;
use leadbook_shared::{
    auth::session::{SessionConfig, SessionManager},
    crypto::SecretBox,
    geocode::{Geocoder, NominatimProvider},
    redis::{RateLimiter, RedisClient},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub redis: RedisClient,
    pub sessions: SessionManager,
    pub geocoder: Geocoder,

    /// Seals SMTP passwords in `app_settings`
    pub secrets: SecretBox,

    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Creates application state
    ///
    /// # Errors
    ///
    /// Fails when the settings encryption key is malformed or the geocoding
    /// HTTP client cannot be built.
    pub fn new(db: PgPool, redis: RedisClient, config: Config) -> anyhow::Result<Self> {
        let secrets = SecretBox::from_hex_key(&config.auth.settings_encryption_key)?;

        let mut session_config = SessionConfig::new(config.auth.token_secret.clone());
        session_config.access_ttl = Duration::days(config.auth.session_ttl_days);
        session_config.refresh_ttl = Duration::days(config.auth.refresh_ttl_days);

        let provider = NominatimProvider::new(config.geocoder.url.clone(), &config.geocoder.user_agent)?;

        Ok(Self {
            sessions: SessionManager::new(db.clone(), session_config),
            geocoder: Geocoder::new(db.clone(), provider),
            rate_limiter: RateLimiter::new(redis.clone()),
            secrets,
            redis,
            db,
            config: Arc::new(config),
        })
    }

    /// Replaces the geocoder (tests inject a fixed provider)
    pub fn with_geocoder(mut self, geocoder: Geocoder) -> Self {
        self.geocoder = geocoder;
        self
    }

    /// Secret keying token digests
    pub fn token_secret(&self) -> &str {
        &self.config.auth.token_secret
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                              public
/// └── /v1
///     ├── /auth/{signup,login,refresh}          public, IP rate limit
///     ├── /auth/password-reset/{request,confirm} public, IP rate limit
///     ├── /auth/{logout,me,password}            session
///     ├── POST /leads                           lead key, IP rate limit
///     ├── GET  /license                         session
///     ├── /clients, /geocode, /map, /bookings   session
///     ├── /email/*, /settings/*                 session + license
///     │   (send, newsletter, test-email add a per-owner rate limit)
///     └── /admin/*                              session + admin
/// ```
pub fn build_router(state: AppState) -> Router {
    let session = || from_fn_with_state(state.clone(), session_auth_layer);
    let license = || from_fn_with_state(state.clone(), license_gate_layer);

    let public_auth_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/password-reset/request", post(routes::auth::request_password_reset))
        .route("/password-reset/confirm", post(routes::auth::confirm_password_reset))
        .layer(from_fn_with_state(state.clone(), auth_rate_limit_layer));

    let session_auth_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me).patch(routes::auth::update_me))
        .route("/password", post(routes::auth::change_password))
        .layer(session());

    let lead_routes = Router::new()
        .route("/leads", post(routes::leads::create_lead))
        .layer(from_fn_with_state(state.clone(), lead_rate_limit_layer));

    let workspace_routes = Router::new()
        .route("/license", get(routes::license::current_license))
        .route(
            "/clients",
            get(routes::clients::list_clients).post(routes::clients::create_client),
        )
        .route(
            "/clients/:id",
            get(routes::clients::get_client)
                .patch(routes::clients::update_client)
                .delete(routes::clients::delete_client),
        )
        .route("/clients/:id/geocode", post(routes::clients::geocode_client))
        .route("/geocode", post(routes::geocode::geocode_address))
        .route("/map/points", get(routes::map::map_points))
        .route("/bookings/pdf", post(routes::bookings::booking_pdf))
        .layer(session());

    // Sends consume the per-owner bucket; the gate runs before it
    let email_send_routes = Router::new()
        .route("/email/send", post(routes::email::send_email))
        .route("/email/newsletter", post(routes::email::send_newsletter))
        .route("/settings/test-email", post(routes::settings::send_test_email))
        .layer(from_fn_with_state(state.clone(), email_rate_limit_layer));

    let licensed_routes = Router::new()
        .route(
            "/email/templates",
            get(routes::email::list_templates).post(routes::email::create_template),
        )
        .route(
            "/email/templates/:id",
            get(routes::email::get_template)
                .put(routes::email::update_template)
                .delete(routes::email::delete_template),
        )
        .route("/email/preview", post(routes::email::preview_email))
        .route("/email/sends", get(routes::email::list_sends))
        .route(
            "/settings",
            get(routes::settings::get_settings).put(routes::settings::update_settings),
        )
        .route("/settings/lead-key", post(routes::settings::rotate_lead_key))
        .merge(email_send_routes)
        .layer(license())
        .layer(session());

    let admin_routes = Router::new()
        .route("/users", get(routes::admin::list_users))
        .route("/users/:id/license", put(routes::admin::set_user_license))
        .route("/audit", get(routes::admin::list_audit))
        .layer(from_fn(admin_layer))
        .layer(session());

    let v1_routes = Router::new()
        .nest("/auth", public_auth_routes.merge(session_auth_routes))
        .nest("/admin", admin_routes)
        .merge(lead_routes)
        .merge(workspace_routes)
        .merge(licensed_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(
            state.config.api.production,
            &state.config.api.map_tile_host,
        ))
        .with_state(state)
}
