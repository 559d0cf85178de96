use std::time::Duration;

use super::parsing::{
    env_flag, env_number, env_optional, env_or, parse_cors_origins, parse_environment,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, ConfigError, DatabaseSettings, PreviewSettings, RedisSettings, RuntimeSettings,
    SecuritySettings, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("EXAMLOCK_ENV").or_else(|| env_optional("ENVIRONMENT")).as_deref(),
        );
        let strict_config = env_flag("EXAMLOCK_STRICT_CONFIG") || environment.is_production();

        let secret_key = env_optional("SECRET_KEY").unwrap_or_else(load_or_create_secret_key);
        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS").as_deref())?;
        let store_timeout_ms: u64 = env_number("EXAMLOCK_STORE_TIMEOUT_MS", 5000)?;

        let settings = Self {
            server: ServerSettings {
                host: env_or("EXAMLOCK_HOST", "0.0.0.0"),
                port: env_number("EXAMLOCK_PORT", 8000)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                project_name: env_or("PROJECT_NAME", "Examlock API"),
                version: env_or("VERSION", env!("CARGO_PKG_VERSION")),
                prefix: env_or("API_V1_STR", "/api/v1"),
                cors_origins,
            },
            security: SecuritySettings { secret_key, algorithm: env_or("ALGORITHM", "HS256") },
            database: DatabaseSettings {
                url: database_url(strict_config)?,
                max_connections: env_number("DATABASE_MAX_CONNECTIONS", 30)?,
            },
            redis: RedisSettings { url: redis_url()? },
            preview: PreviewSettings {
                require_completed_preview: env_flag("EXAMLOCK_REQUIRE_COMPLETED_PREVIEW"),
                store_timeout: Duration::from_millis(store_timeout_ms),
                marking_edit_rate_limit: env_number("MARKING_EDIT_RATE_LIMIT", 60)?,
                marking_edit_rate_window_seconds: env_number(
                    "MARKING_EDIT_RATE_WINDOW_SECONDS",
                    60,
                )?,
            },
            telemetry: TelemetrySettings {
                log_level: env_or("EXAMLOCK_LOG_LEVEL", "info"),
                json: env_flag("EXAMLOCK_LOG_JSON"),
                prometheus_enabled: env_flag("PROMETHEUS_ENABLED"),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn preview(&self) -> &PreviewSettings {
        &self.preview
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let preview = &self.preview;
        let zero_checks = [
            ("EXAMLOCK_PORT", self.server.port == 0),
            ("EXAMLOCK_STORE_TIMEOUT_MS", preview.store_timeout.is_zero()),
            ("MARKING_EDIT_RATE_WINDOW_SECONDS", preview.marking_edit_rate_window_seconds == 0),
            ("DATABASE_MAX_CONNECTIONS", self.database.max_connections == 0),
        ];

        match zero_checks.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::InvalidValue { field, value: "0".to_string() }),
            None => Ok(()),
        }
    }
}

/// `DATABASE_URL` wins; otherwise the URL is assembled from the `POSTGRES_*`
/// parts, which in strict mode must carry a password.
fn database_url(strict_config: bool) -> Result<String, ConfigError> {
    if let Some(url) = env_optional("DATABASE_URL") {
        return Ok(url);
    }

    let password = env_or("POSTGRES_PASSWORD", "");
    if strict_config && password.is_empty() {
        return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
    }

    let port: u16 = env_number("POSTGRES_PORT", 5432)?;
    Ok(format!(
        "postgresql://{}:{password}@{}:{port}/{}",
        env_or("POSTGRES_USER", "examlock"),
        env_or("POSTGRES_SERVER", "localhost"),
        env_or("POSTGRES_DB", "examlock_db"),
    ))
}

fn redis_url() -> Result<String, ConfigError> {
    let host = env_or("REDIS_HOST", "localhost");
    let port: u16 = env_number("REDIS_PORT", 6379)?;
    let db: u16 = env_number("REDIS_DB", 0)?;

    Ok(match env_optional("REDIS_PASSWORD") {
        Some(password) => format!("redis://:{password}@{host}:{port}/{db}"),
        None => format!("redis://{host}:{port}/{db}"),
    })
}
