/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// Required:
/// - `DATABASE_URL`: PostgreSQL connection string
/// - `REDIS_URL`: Redis connection string (rate limiting)
/// - `TOKEN_SECRET`: Key for session and reset token digests (>= 32 chars)
/// - `SETTINGS_ENCRYPTION_KEY`: 64 hex chars, seals stored SMTP passwords
///
/// Optional:
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for any (default: `*`)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `TRUST_PROXY`: Read the client IP from `X-Forwarded-For` / `X-Real-IP`;
///   enable only behind a reverse proxy that overwrites them (default: false)
/// - `APP_BASE_URL`: Front-end URL used in reset links (default: http://localhost:3000)
/// - `MAP_TILE_HOST`: Tile server allowed by the CSP (default: https://tile.openstreetmap.org)
/// - `ADMIN_EMAILS`: Comma-separated admin allowlist
/// - `TRIAL_DAYS`: Length of the signup trial (default: 14)
/// - `SESSION_TTL_DAYS` / `REFRESH_TTL_DAYS`: Session lifetimes (default: 7 / 30)
/// - `GEOCODER_URL`: Nominatim-compatible endpoint
/// - `GEOCODER_USER_AGENT`: User-Agent sent to the geocoder
///
/// # Example
///
/// ```no_run
/// use leadbook_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use leadbook_shared::auth::authorization::parse_allowlist;
use leadbook_shared::auth::session::{DEFAULT_ACCESS_TTL_DAYS, DEFAULT_REFRESH_TTL_DAYS};
use leadbook_shared::geocode::DEFAULT_GEOCODER_URL;
use serde::{Deserialize, Serialize};
use std::env;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub redis: RedisSettings,
    pub auth: AuthConfig,
    pub geocoder: GeocoderConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins (`*` = permissive)
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,

    /// Honor forwarded client IP headers
    pub trust_proxy: bool,

    /// Browser-facing base URL
    pub app_base_url: String,

    /// Map tile origin allowed in `img-src`
    pub map_tile_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

/// Authentication and licensing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret keying token digests
    ///
    /// IMPORTANT: must be kept secret and at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub token_secret: String,

    /// 32-byte AES key, hex encoded
    pub settings_encryption_key: String,

    /// Lowercased admin emails
    pub admin_emails: Vec<String>,

    pub trial_days: i64,
    pub session_ttl_days: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    pub url: String,
    pub user_agent: String,
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let token_secret = required("TOKEN_SECRET")?;
        if token_secret.len() < 32 {
            anyhow::bail!("TOKEN_SECRET must be at least 32 characters long");
        }

        let settings_encryption_key = required("SETTINGS_ENCRYPTION_KEY")?;
        if settings_encryption_key.len() != 64 {
            anyhow::bail!("SETTINGS_ENCRYPTION_KEY must be 64 hex characters");
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("API_PORT", 8080)?,
                cors_origins,
                production: parsed("PRODUCTION", false)?,
                trust_proxy: parsed("TRUST_PROXY", false)?,
                app_base_url: env::var("APP_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                map_tile_host: env::var("MAP_TILE_HOST")
                    .unwrap_or_else(|_| "https://tile.openstreetmap.org".to_string()),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisSettings {
                url: required("REDIS_URL")?,
            },
            auth: AuthConfig {
                token_secret,
                settings_encryption_key,
                admin_emails: parse_allowlist(&env::var("ADMIN_EMAILS").unwrap_or_default()),
                trial_days: parsed("TRIAL_DAYS", 14)?,
                session_ttl_days: parsed("SESSION_TTL_DAYS", DEFAULT_ACCESS_TTL_DAYS)?,
                refresh_ttl_days: parsed("REFRESH_TTL_DAYS", DEFAULT_REFRESH_TTL_DAYS)?,
            },
            geocoder: GeocoderConfig {
                url: env::var("GEOCODER_URL").unwrap_or_else(|_| DEFAULT_GEOCODER_URL.to_string()),
                user_agent: env::var("GEOCODER_USER_AGENT")
                    .unwrap_or_else(|_| format!("leadbook/{}", env!("CARGO_PKG_VERSION"))),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether CORS should allow any origin
    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["https://app.example.com".to_string()],
                production: false,
                trust_proxy: false,
                app_base_url: "https://app.example.com".to_string(),
                map_tile_host: "https://tile.openstreetmap.org".to_string(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            redis: RedisSettings {
                url: "redis://localhost:6379".to_string(),
            },
            auth: AuthConfig {
                token_secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                settings_encryption_key: "00".repeat(32),
                admin_emails: vec![],
                trial_days: 14,
                session_ttl_days: 7,
                refresh_ttl_days: 30,
            },
            geocoder: GeocoderConfig {
                url: DEFAULT_GEOCODER_URL.to_string(),
                user_agent: "leadbook-test".to_string(),
            },
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(sample().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_cors_permissive() {
        let mut config = sample();
        assert!(!config.cors_permissive());

        config.api.cors_origins.push("*".to_string());
        assert!(config.cors_permissive());
    }
}
