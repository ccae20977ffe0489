use super::parsing::{
    env_optional, env_or_default, normalize_base_url, parse_bool, parse_cors_origins,
    parse_environment, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, AttemptSettings, ConfigError, CorsSettings, DatabaseSettings, DispatchSettings,
    RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("LEARNHUB_HOST", "0.0.0.0");
        let port = env_or_default("LEARNHUB_PORT", "8000");

        let environment = parse_environment(
            env_optional("LEARNHUB_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("LEARNHUB_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "LearnHub Grading API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "learnhub");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "learnhub_exercises");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "30"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let start_rate_limit =
            parse_u64("ATTEMPT_START_RATE_LIMIT", env_or_default("ATTEMPT_START_RATE_LIMIT", "5"))?;
        let start_rate_window_seconds = parse_u64(
            "ATTEMPT_START_RATE_WINDOW_SECONDS",
            env_or_default("ATTEMPT_START_RATE_WINDOW_SECONDS", "10"),
        )?;
        let max_answers_per_batch =
            parse_usize("MAX_ANSWERS_PER_BATCH", env_or_default("MAX_ANSWERS_PER_BATCH", "500"))?;
        let abandon_sweep_interval_seconds = parse_u64(
            "ABANDON_SWEEP_INTERVAL_SECONDS",
            env_or_default("ABANDON_SWEEP_INTERVAL_SECONDS", "300"),
        )?;
        let abandon_grace_seconds =
            parse_u64("ABANDON_GRACE_SECONDS", env_or_default("ABANDON_GRACE_SECONDS", "300"))?;

        let user_service_url = normalize_base_url(env_or_default("USER_SERVICE_URL", ""));
        let notification_service_url =
            normalize_base_url(env_or_default("NOTIFICATION_SERVICE_URL", ""));
        let internal_api_key = env_or_default("INTERNAL_API_KEY", "");
        let request_timeout_seconds = parse_u64(
            "DISPATCH_REQUEST_TIMEOUT_SECONDS",
            env_or_default("DISPATCH_REQUEST_TIMEOUT_SECONDS", "10"),
        )?;
        let max_attempts =
            parse_u32("DISPATCH_MAX_ATTEMPTS", env_or_default("DISPATCH_MAX_ATTEMPTS", "3"))?;
        let initial_backoff_ms = parse_u64(
            "DISPATCH_INITIAL_BACKOFF_MS",
            env_or_default("DISPATCH_INITIAL_BACKOFF_MS", "1000"),
        )?;
        let queue_capacity =
            parse_usize("DISPATCH_QUEUE_CAPACITY", env_or_default("DISPATCH_QUEUE_CAPACITY", "1024"))?;
        let concurrency =
            parse_usize("DISPATCH_CONCURRENCY", env_or_default("DISPATCH_CONCURRENCY", "8"))?;

        let log_level = env_or_default("LEARNHUB_LOG_LEVEL", "info");
        let json = env_optional("LEARNHUB_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            attempts: AttemptSettings {
                start_rate_limit,
                start_rate_window_seconds,
                max_answers_per_batch,
                abandon_sweep_interval_seconds,
                abandon_grace_seconds,
            },
            dispatch: DispatchSettings {
                user_service_url,
                notification_service_url,
                internal_api_key,
                request_timeout_seconds,
                max_attempts,
                initial_backoff_ms,
                queue_capacity,
                concurrency,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn attempts(&self) -> &AttemptSettings {
        &self.attempts
    }

    pub(crate) fn dispatch(&self) -> &DispatchSettings {
        &self.dispatch
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DISPATCH_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DISPATCH_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }

        if self.dispatch.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DISPATCH_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.attempts.max_answers_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_ANSWERS_PER_BATCH",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }

    /// Only the API process delivers completion events, so only it checks the collaborators.
    pub(crate) fn require_dispatch_targets(&self) -> Result<(), ConfigError> {
        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.dispatch.user_service_url.is_empty() {
            return Err(ConfigError::MissingSecret("USER_SERVICE_URL"));
        }
        if self.dispatch.notification_service_url.is_empty() {
            return Err(ConfigError::MissingSecret("NOTIFICATION_SERVICE_URL"));
        }
        if self.dispatch.internal_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("INTERNAL_API_KEY"));
        }

        Ok(())
    }
}
