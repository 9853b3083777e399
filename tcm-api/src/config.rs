/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_CORS_ORIGINS`: comma-separated allowed origins (default: `*`)
/// - `API_PRODUCTION`: enables HSTS and `Secure` cookies (default: false)
/// - `API_MAX_UPLOAD_BYTES`: import body limit (default: 5 MiB)
/// - `JWT_SECRET`: Secret key for JWT signing (required, at least 32 characters)
/// - `SESSION_COOKIE_NAME`: access token cookie (default: tcm_session)
/// - `AUTH_REQUIRE_VERIFIED_EMAIL`: refuse login before verification (default: false)
/// - `PUBLIC_BASE_URL`: frontend URL used in mail links (default: http://localhost:4200)
/// - `RUST_LOG` / `LOG_FORMAT`: read by `main` for the tracing subscriber
///
/// # Example
///
/// ```no_run
/// use tcm_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Default import body limit
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Session and onboarding settings
    pub auth: AuthConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any origin without credentials
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS, `Secure` cookies)
    pub production: bool,

    /// Largest accepted import upload
    pub max_upload_bytes: usize,

    /// Base URL of the frontend, used to build links in mails
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the cookie carrying the access token
    pub session_cookie: String,

    /// Name of the cookie carrying the refresh token
    pub refresh_cookie: String,

    /// Refuse login until the email address is verified
    pub require_verified_email: bool,
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

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let cors_origins = var("API_CORS_ORIGINS", "*")
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let session_cookie = var("SESSION_COOKIE_NAME", "tcm_session");
        let refresh_cookie = format!("{}_refresh", session_cookie);

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST", "0.0.0.0"),
                port: parse_var("API_PORT", &var("API_PORT", "8080"))?,
                cors_origins,
                production: parse_bool("API_PRODUCTION", &var("API_PRODUCTION", "false"))?,
                max_upload_bytes: parse_var(
                    "API_MAX_UPLOAD_BYTES",
                    &var("API_MAX_UPLOAD_BYTES", &DEFAULT_MAX_UPLOAD_BYTES.to_string()),
                )?,
                public_base_url: var("PUBLIC_BASE_URL", "http://localhost:4200"),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_var(
                    "DATABASE_MAX_CONNECTIONS",
                    &var("DATABASE_MAX_CONNECTIONS", "10"),
                )?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            auth: AuthConfig {
                session_cookie,
                refresh_cookie,
                require_verified_email: parse_bool(
                    "AUTH_REQUIRE_VERIFIED_EMAIL",
                    &var("AUTH_REQUIRE_VERIFIED_EMAIL", "false"),
                )?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin may call the API
    pub fn allows_any_origin(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}

fn parse_var<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, value, e))
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got '{}'", key, other),
    }
}
