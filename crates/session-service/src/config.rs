use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::services::rotation_service::RotationMode;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 900;

/// Default refresh token lifetime in the session cache (7 days).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 604_800;

/// Default lifetime of a cached user snapshot (1 hour).
pub const DEFAULT_USER_CACHE_TTL_SECONDS: u64 = 3600;

/// Upper bound on detached cache writes and deletions.
pub const DEFAULT_BACKGROUND_TASK_TIMEOUT_SECONDS: u64 = 60;

pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default bcrypt cost factor (2^12 iterations).
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Bcrypt costs below this are considered insecure.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Bcrypt costs above this make sign-in latency unacceptable.
pub const MAX_BCRYPT_COST: u32 = 14;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub bind_address: String,
    /// Symmetric HS256 secret shared by every issuer and verifier.
    pub jwt_secret: SecretString,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub user_cache_ttl: Duration,
    pub background_task_timeout: Duration,
    pub rotation_mode: RotationMode,
    pub bcrypt_cost: u32,
    pub shutdown_timeout: Duration,
    pub db_max_connections: u32,
}

/// Connection URLs may carry credentials and are never printed.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("user_cache_ttl", &self.user_cache_ttl)
            .field("background_task_timeout", &self.background_task_timeout)
            .field("rotation_mode", &self.rotation_mode)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("db_max_connections", &self.db_max_connections)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;
        let redis_url = required(vars, "REDIS_URL")?;

        let jwt_secret = required(vars, "JWT_SECRET")?;
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "JWT_SECRET".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let access_token_ttl = seconds(
            vars,
            "ACCESS_TOKEN_TTL_SECONDS",
            DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
        )?;
        let refresh_token_ttl = seconds(
            vars,
            "REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        )?;
        let user_cache_ttl = seconds(
            vars,
            "USER_CACHE_TTL_SECONDS",
            DEFAULT_USER_CACHE_TTL_SECONDS,
        )?;
        let background_task_timeout = seconds(
            vars,
            "BACKGROUND_TASK_TIMEOUT_SECONDS",
            DEFAULT_BACKGROUND_TASK_TIMEOUT_SECONDS,
        )?;
        let shutdown_timeout = seconds(
            vars,
            "SHUTDOWN_TIMEOUT_SECONDS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        )?;

        let rotation_mode = match vars.get("REFRESH_ROTATION_MODE") {
            Some(raw) => RotationMode::from_str(raw).map_err(|reason| ConfigError::InvalidValue {
                name: "REFRESH_ROTATION_MODE".to_string(),
                reason,
            })?,
            None => RotationMode::default(),
        };

        let bcrypt_cost = parsed(vars, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                name: "BCRYPT_COST".to_string(),
                reason: format!(
                    "{} is outside {}-{}",
                    bcrypt_cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
                ),
            });
        }

        let db_max_connections = parsed(vars, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DB_MAX_CONNECTIONS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Config {
            database_url,
            redis_url,
            bind_address,
            jwt_secret: SecretString::from(jwt_secret),
            access_token_ttl,
            refresh_token_ttl,
            user_cache_ttl,
            background_task_timeout,
            rotation_mode,
            bcrypt_cost,
            shutdown_timeout,
            db_max_connections,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parsed<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("'{}' is not a valid number", raw),
        }),
        None => Ok(default),
    }
}

/// Parse a strictly positive number of seconds.
fn seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let value: u64 = parsed(vars, name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}
