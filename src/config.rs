use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use dotenvy::dotenv;
use thiserror::Error;

const MAX_TOKEN_TTL_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Photo bucket credentials. Uploads are refused when these are absent.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bind_addr: String,
    pub port: u16,
    pub storage: Option<StorageConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let storage = match (lookup("STORAGE_URL"), lookup("STORAGE_KEY")) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some(StorageConfig {
                url,
                key,
                bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "booking-photos".to_string()),
            }),
            _ => None,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            token_ttl_days: token_ttl(&lookup)?,
            port: parse_or(&lookup, "PORT", 3000)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            storage,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_addr, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid { name: "BIND_ADDR", value: raw })
    }
}

/// Positive and small enough for a token expiry to stay representable.
fn token_ttl(lookup: &impl Fn(&str) -> Option<String>) -> Result<i64, ConfigError> {
    let days: i64 = parse_or(lookup, "TOKEN_TTL_DAYS", 5)?;
    if days <= 0 || days > MAX_TOKEN_TTL_DAYS || Duration::try_days(days).is_none() {
        return Err(ConfigError::Invalid {
            name: "TOKEN_TTL_DAYS",
            value: days.to_string(),
        });
    }
    Ok(days)
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
