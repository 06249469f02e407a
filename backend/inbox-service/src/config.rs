use crate::error::AppError;
use crate::services::message_service::DEFAULT_MAX_MESSAGE_LENGTH;
use db_pool::env_utils::parse_env_with_default;
use dotenvy::dotenv;
use resilience::RetryConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Config(format!("unknown STORE_BACKEND: {other}"))),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    /// Default archived policy of the unread aggregate
    pub unread_include_archived: bool,
    pub max_message_length: usize,
    pub store_retry: RetryConfig,
    /// Per-attempt deadline for store calls made by request handlers
    pub store_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("store_backend", &self.store_backend)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("port", &self.port)
            .field("jwt_secret", &"[REDACTED]")
            .field("unread_include_archived", &self.unread_include_archived)
            .field("max_message_length", &self.max_message_length)
            .field("store_retry", &self.store_retry)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL missing".into()));
        }

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let defaults = RetryConfig::default();
        let store_retry = RetryConfig {
            max_retries: parse_env_with_default("STORE_RETRY_MAX", defaults.max_retries),
            initial_backoff: Duration::from_millis(parse_env_with_default(
                "STORE_RETRY_INITIAL_MS",
                defaults.initial_backoff.as_millis() as u64,
            )),
            ..defaults
        };

        Ok(Self {
            store_backend,
            database_url,
            port: parse_env_with_default("PORT", 8080),
            jwt_secret,
            unread_include_archived: parse_env_with_default("UNREAD_INCLUDE_ARCHIVED", true),
            max_message_length: parse_env_with_default("MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH),
            store_retry,
            store_timeout: Duration::from_millis(parse_env_with_default("STORE_TIMEOUT_MS", 5000)),
        })
    }

    /// In-memory settings for tests and local tooling
    pub fn for_memory(jwt_secret: &str) -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            port: 0,
            jwt_secret: jwt_secret.to_string(),
            unread_include_archived: true,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            store_retry: RetryConfig::disabled(),
            store_timeout: Duration::from_secs(5),
        }
    }
}
