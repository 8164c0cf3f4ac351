//! Process-wide configuration, loaded once at start-up from the environment
//! and treated as immutable thereafter.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite DSN, e.g. `sqlite://gateway.db` or `sqlite::memory:`.
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,

    /// The single operator credential with full-fleet access.
    pub admin_api_key: String,

    pub log_level: String,
    pub log_format: LogFormat,

    pub qr_timeout: Duration,

    pub webhook_timeout: Duration,
    pub webhook_max_retries: u32,
    pub webhook_worker_count: usize,
    pub webhook_queue_capacity: usize,
    pub webhook_base_backoff: Duration,
    pub webhook_max_backoff: Duration,
    pub webhook_jitter: f64,

    pub credential_cache_positive_ttl: Duration,
    pub credential_cache_negative_ttl: Duration,

    /// Per-session deadline for restart reconciliation.
    pub reconnect_deadline: Duration,

    /// When set, outbound webhook deliveries carry an `X-Webhook-Signature`
    /// header: `hex(hmac_sha256(secret, body))`. Optional hardening for
    /// consumers that want to verify the request actually came from this
    /// gateway; omit to skip signing entirely.
    pub webhook_signing_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    /// Loads configuration from the process environment, applying
    /// documented defaults for everything not required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_api_key =
            std::env::var("ADMIN_API_KEY").map_err(|_| ConfigError::Missing("ADMIN_API_KEY"))?;
        if admin_api_key.trim().len() < 16 {
            return Err(ConfigError::Invalid {
                name: "ADMIN_API_KEY",
                value: "must be at least 16 characters".into(),
            });
        }

        let database_url =
            env_or("DATABASE_URL", || "sqlite://gateway.db?mode=rwc".to_string());
        let server_host = env_or("SERVER_HOST", || "127.0.0.1".to_string());
        let server_port = env_parse_or("SERVER_PORT", 8080)?;
        let environment = env_or("ENVIRONMENT", || "development".to_string());
        let log_level = env_or("LOG_LEVEL", || "info".to_string());
        let log_format = match env_or("LOG_FORMAT", || "pretty".to_string()).as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let qr_timeout = Duration::from_secs(env_parse_or("QR_TIMEOUT_SECS", 60)?);
        let webhook_timeout = Duration::from_secs(env_parse_or("WEBHOOK_TIMEOUT_SECS", 10)?);
        let webhook_max_retries = env_parse_or("WEBHOOK_MAX_RETRIES", 3)?;
        let webhook_worker_count = env_parse_or("WEBHOOK_WORKER_COUNT", 5)?;
        let webhook_queue_capacity = env_parse_or("WEBHOOK_QUEUE_CAPACITY", 10_000)?;
        let webhook_base_backoff = Duration::from_secs(env_parse_or("WEBHOOK_BASE_BACKOFF_SECS", 2)?);
        let webhook_max_backoff = Duration::from_secs(env_parse_or("WEBHOOK_MAX_BACKOFF_SECS", 60)?);
        let webhook_jitter: f64 = env_parse_or("WEBHOOK_JITTER", 0.2)?;
        let webhook_signing_secret =
            std::env::var("WEBHOOK_SIGNING_SECRET").ok().filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            server_host,
            server_port,
            environment,
            admin_api_key,
            log_level,
            log_format,
            qr_timeout,
            webhook_timeout,
            webhook_max_retries,
            webhook_worker_count,
            webhook_queue_capacity,
            webhook_base_backoff,
            webhook_max_backoff,
            webhook_jitter,
            credential_cache_positive_ttl: Duration::from_secs(
                env_parse_or("CREDENTIAL_CACHE_POSITIVE_TTL_SECS", 300)?,
            ),
            credential_cache_negative_ttl: Duration::from_secs(
                env_parse_or("CREDENTIAL_CACHE_NEGATIVE_TTL_SECS", 30)?,
            ),
            reconnect_deadline: Duration::from_secs(
                env_parse_or("RECONNECT_DEADLINE_SECS", 60)?,
            ),
            webhook_signing_secret,
        })
    }

    /// A configuration suitable for tests: random admin key, in-memory DB.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            server_host: "127.0.0.1".into(),
            server_port: 0,
            environment: "test".into(),
            admin_api_key: "test-admin-key-0123456789".into(),
            log_level: "debug".into(),
            log_format: LogFormat::Pretty,
            qr_timeout: Duration::from_secs(60),
            webhook_timeout: Duration::from_secs(10),
            webhook_max_retries: 3,
            webhook_worker_count: 2,
            webhook_queue_capacity: 100,
            webhook_base_backoff: Duration::from_millis(10),
            webhook_max_backoff: Duration::from_millis(50),
            webhook_jitter: 0.2,
            credential_cache_positive_ttl: Duration::from_secs(300),
            credential_cache_negative_ttl: Duration::from_secs(30),
            reconnect_deadline: Duration::from_secs(5),
            webhook_signing_secret: None,
        }
    }
}

fn env_or(key: &str, default: impl FnOnce() -> String) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(default)
}

fn env_parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name: key, value: raw }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn rejects_short_admin_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ADMIN_API_KEY", "short");
        }
        let result = Config::from_env();
        unsafe {
            std::env::remove_var("ADMIN_API_KEY");
        }
        assert!(result.is_err());
    }

    #[test]
    fn loads_defaults_with_valid_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ADMIN_API_KEY", "a-sufficiently-long-admin-key");
        }
        let config = Config::from_env().unwrap();
        unsafe {
            std::env::remove_var("ADMIN_API_KEY");
        }
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.webhook_max_retries, 3);
        assert_eq!(config.qr_timeout, Duration::from_secs(60));
    }
}
