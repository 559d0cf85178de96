use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) server: ServerSettings,
    pub(super) runtime: RuntimeSettings,
    pub(super) api: ApiSettings,
    pub(super) security: SecuritySettings,
    pub(super) database: DatabaseSettings,
    pub(super) redis: RedisSettings,
    pub(super) preview: PreviewSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(super) host: String,
    pub(super) port: u16,
}

/// Public face of the HTTP API.
#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    /// Mount point of the versioned routes, `/api/v1` by default.
    pub(crate) prefix: String,
    pub(crate) cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SecuritySettings {
    pub(crate) secret_key: String,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(super) url: String,
    pub(crate) max_connections: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct RedisSettings {
    pub(super) url: String,
}

/// Knobs of the preview/finalization workflow.
#[derive(Debug, Clone)]
pub(crate) struct PreviewSettings {
    /// When set, `finalize` is only accepted from `preview_complete`.
    pub(crate) require_completed_preview: bool,
    pub(super) store_timeout: Duration,
    pub(crate) marking_edit_rate_limit: u64,
    pub(crate) marking_edit_rate_window_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub(super) fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        })
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> &str {
        &self.url
    }
}

impl RedisSettings {
    pub(crate) fn redis_url(&self) -> String {
        self.url.clone()
    }
}

impl PreviewSettings {
    /// Budget for one exam store call, connection acquisition included.
    pub(crate) fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}
