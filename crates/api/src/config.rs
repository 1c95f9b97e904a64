use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// Entitlement engine settings.
    pub engine: EngineConfig,
}

/// Settings for the activation engine and provider client.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Provider API root, e.g. `https://licensing.example.com/v1`.
    pub provider_url: String,
    /// Bearer token for the provider API.
    pub provider_token: String,
    /// Hard timeout for every provider call in seconds (default: `10`).
    pub provider_timeout_secs: u64,
    /// Credential cache TTL in seconds (default: `300`).
    pub provider_token_ttl_secs: u64,
    /// Trailing concurrency window in hours (default: `2`).
    pub activation_window_hours: i64,
    /// Per-email request budget for `/license/check` (default: `10`/min).
    pub check_rate_limit_per_min: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default     |
    /// |-----------------------------|-------------|
    /// | `HOST`                      | `0.0.0.0`   |
    /// | `PORT`                      | `3000`      |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`        |
    /// | `PROVIDER_URL`              | -- (required) |
    /// | `PROVIDER_TOKEN`            | -- (required) |
    /// | `PROVIDER_TIMEOUT_SECS`     | `10`        |
    /// | `PROVIDER_TOKEN_TTL_SECS`   | `300`       |
    /// | `ACTIVATION_WINDOW_HOURS`   | `2`         |
    /// | `CHECK_RATE_LIMIT_PER_MIN`  | `10`        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from environment variables.
    ///
    /// # Panics
    ///
    /// Panics if `PROVIDER_URL` or `PROVIDER_TOKEN` is missing --
    /// the service cannot make entitlement decisions without them.
    pub fn from_env() -> Self {
        let provider_url =
            std::env::var("PROVIDER_URL").expect("PROVIDER_URL must be set in the environment");
        let provider_token =
            std::env::var("PROVIDER_TOKEN").expect("PROVIDER_TOKEN must be set in the environment");

        let provider_timeout_secs: u64 = std::env::var("PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("PROVIDER_TIMEOUT_SECS must be a valid u64");

        let provider_token_ttl_secs: u64 = std::env::var("PROVIDER_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("PROVIDER_TOKEN_TTL_SECS must be a valid u64");

        let activation_window_hours: i64 = std::env::var("ACTIVATION_WINDOW_HOURS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("ACTIVATION_WINDOW_HOURS must be a valid i64");

        let check_rate_limit_per_min: u32 = std::env::var("CHECK_RATE_LIMIT_PER_MIN")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("CHECK_RATE_LIMIT_PER_MIN must be a valid u32");

        Self {
            provider_url,
            provider_token,
            provider_timeout_secs,
            provider_token_ttl_secs,
            activation_window_hours,
            check_rate_limit_per_min,
        }
    }
}
