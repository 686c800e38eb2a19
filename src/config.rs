//! Environment-derived configuration.
//!
//! Every knob is an environment variable with a documented default; only the
//! bot credential is required. Parsing is forgiving: a malformed number falls
//! back to the default rather than failing startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Chat-platform bot configuration.
#[derive(Clone)]
pub struct BotConfig {
    /// Bot credential (`BOT_TOKEN`). Required.
    pub token: SecretString,
    /// Platform API base url (`MAX_API_URL`).
    pub api_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("BOT_TOKEN".into()))?;

        Ok(Self {
            token: SecretString::from(token),
            api_url: env_or("MAX_API_URL", "https://botapi.max.ru"),
        })
    }
}

/// Broker / task-queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Broker address (`AMQP_URL`).
    pub amqp_url: String,
    /// Durable queue name (`QUEUE_NAME`).
    pub queue_name: String,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            amqp_url: env_or("AMQP_URL", "amqp://127.0.0.1:5672/%2f"),
            queue_name: env_or("QUEUE_NAME", "check"),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path (`DATABASE_PATH`).
    pub path: String,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            path: env_or("DATABASE_PATH", "./data/linkguard.db"),
        }
    }
}

/// Verdict-service (Kaspersky OpenTIP) configuration.
#[derive(Clone)]
pub struct ScannerConfig {
    /// API key (`OPENTIP_API_KEY`). When unset every check degrades to an
    /// `unknown` verdict instead of calling out.
    pub api_key: Option<SecretString>,
    /// Vendor API base url (`OPENTIP_API_URL`).
    pub api_url: String,
    /// Per-request timeout (`OPENTIP_TIMEOUT_MS`, default 10000).
    pub timeout: Duration,
    /// File-result poll budget (`OPENTIP_POLL_ATTEMPTS`, default 5).
    pub poll_attempts: u32,
    /// Delay between file-result polls (`OPENTIP_POLL_INTERVAL_MS`, default 5000).
    pub poll_interval: Duration,
}

impl ScannerConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENTIP_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            api_url: env_or("OPENTIP_API_URL", "https://opentip.kaspersky.com/api/v1"),
            timeout: Duration::from_millis(env_parse_or("OPENTIP_TIMEOUT_MS", 10_000)),
            poll_attempts: env_parse_or("OPENTIP_POLL_ATTEMPTS", 5),
            poll_interval: Duration::from_millis(env_parse_or("OPENTIP_POLL_INTERVAL_MS", 5_000)),
        }
    }
}

/// Worker-pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// In-flight task credit per consumer process (`WORKER_PREFETCH`).
    pub prefetch: u16,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            prefetch: env_parse_or("WORKER_PREFETCH", 10),
        }
    }
}
