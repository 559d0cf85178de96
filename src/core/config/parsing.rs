use std::env;
use std::str::FromStr;

use super::types::{ConfigError, Environment};

const LOCAL_CORS_ORIGINS: [&str; 3] =
    ["http://localhost:5173", "http://localhost:3000", "http://localhost:8080"];

/// Trimmed value of `key`; unset and blank are the same thing.
pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn env_flag(key: &str) -> bool {
    env_optional(key).is_some_and(|value| parse_bool(&value))
}

pub(super) fn env_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_optional(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue { field: key, value }),
        None => Ok(default),
    }
}

/// JSON array or comma-separated list. Nothing usable falls back to the local
/// dev origins.
pub(super) fn parse_cors_origins(raw: Option<&str>) -> Result<Vec<String>, ConfigError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    let origins: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|_| ConfigError::InvalidCors(raw.to_string()))?
    } else {
        raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(String::from).collect()
    };

    if origins.is_empty() {
        return Ok(LOCAL_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect());
    }
    Ok(origins)
}

pub(super) fn parse_bool(value: &str) -> bool {
    ["1", "true", "yes", "on"].iter().any(|truthy| value.eq_ignore_ascii_case(truthy))
}

pub(super) fn parse_environment(value: Option<&str>) -> Environment {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("production" | "prod") => Environment::Production,
        Some("test" | "testing") => Environment::Test,
        _ => Environment::Development,
    }
}
