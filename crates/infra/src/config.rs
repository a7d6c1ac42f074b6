//! Process configuration loaded from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `USE_PERSISTENT_STORES` | `false` (in-memory wiring) |
//! | `DATABASE_URL` | required when persistent |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `REDIS_URL` | `redis://localhost:6379` |
//! | `HTTP_PORT` | `8080` |
//! | `CACHE_TTL_SECS` | `60` |
//! | `AUDIT_TIMEOUT_SECS` | `5` |
//! | `AUDIT_SUBJECT_PATTERN` | `good.*` |
//!
//! Both durations must be at least one second.

use std::time::Duration;

use thiserror::Error;

use goods_events::SUBJECT_WILDCARD;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required when USE_PERSISTENT_STORES=true")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub http_port: u16,
    pub cache_ttl: Duration,
    pub audit_timeout: Duration,
    pub audit_subject_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_persistent_stores: false,
            database_url: None,
            database_max_connections: 10,
            redis_url: "redis://localhost:6379".to_string(),
            http_port: 8080,
            cache_ttl: Duration::from_secs(60),
            audit_timeout: Duration::from_secs(5),
            audit_subject_pattern: SUBJECT_WILDCARD.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let use_persistent_stores = match lookup("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing {
                name: "DATABASE_URL",
            });
        }

        let redis_url = match lookup("REDIS_URL") {
            Some(v) => v,
            None => {
                if use_persistent_stores {
                    tracing::warn!(default = %defaults.redis_url, "REDIS_URL not set; using default");
                }
                defaults.redis_url
            }
        };

        Ok(Self {
            use_persistent_stores,
            database_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            redis_url,
            http_port: parse_or(&lookup, "HTTP_PORT", defaults.http_port)?,
            cache_ttl: parse_secs(&lookup, "CACHE_TTL_SECS", defaults.cache_ttl)?,
            audit_timeout: parse_secs(&lookup, "AUDIT_TIMEOUT_SECS", defaults.audit_timeout)?,
            audit_subject_pattern: lookup("AUDIT_SUBJECT_PATTERN")
                .unwrap_or(defaults.audit_subject_pattern),
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Whole seconds, at least 1.
fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_or(lookup, name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
