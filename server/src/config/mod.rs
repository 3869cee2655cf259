use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::claims::MIN_SECRET_LEN;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TX_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RATE_PER_SECOND: u32 = 1;
const DEFAULT_RATE_BURST: u32 = 5;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Sustained requests per second per client IP; 0 disables limiting.
    pub per_second: u32,
    pub burst: u32,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub tx_timeout: Duration,
    pub rate_limit: RateLimitSettings,
    pub reconcile_interval: Option<Duration>,
    pub cors_allowed_origins: Vec<String>,
    pub production: bool,
}

impl Config {
    /// Reads and validates the whole configuration up front so a bad
    /// deployment fails at startup rather than on the first request.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;

        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let max_connections =
            parsed(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DATABASE_MAX_CONNECTIONS",
                reason: "must be greater than 0".to_string(),
            });
        }

        let tx_timeout_secs = parsed(&lookup, "TX_TIMEOUT_SECS", DEFAULT_TX_TIMEOUT_SECS)?;
        if tx_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "TX_TIMEOUT_SECS",
                reason: "must be greater than 0".to_string(),
            });
        }

        let rate_limit = RateLimitSettings {
            per_second: parsed(&lookup, "RATE_LIMIT_PER_SECOND", DEFAULT_RATE_PER_SECOND)?,
            burst: parsed(&lookup, "RATE_LIMIT_BURST", DEFAULT_RATE_BURST)?,
        };

        let reconcile_secs = parsed(
            &lookup,
            "RECONCILE_INTERVAL_SECS",
            DEFAULT_RECONCILE_INTERVAL_SECS,
        )?;

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let production = lookup("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            max_connections,
            tx_timeout: Duration::from_secs(tx_timeout_secs),
            rate_limit,
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            cors_allowed_origins,
            production,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("'{raw}': {e}"),
        }),
    }
}
