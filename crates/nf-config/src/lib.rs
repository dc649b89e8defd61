//! Notification worker configuration system.
//!
//! TOML-based configuration with environment variable overrides, following
//! the same file-search-then-env-override two-phase load as the reference
//! configuration crate this workspace grew out of.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pubsub: PubSubConfig,
    pub dedupe: DedupeConfig,
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub http: HttpConfig,
    pub secrets: SecretsConfig,
    /// `RUST_LOG`-style filter directive; a plain level name like "info" is
    /// also accepted.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            pubsub: PubSubConfig::default(),
            dedupe: DedupeConfig::default(),
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            http: HttpConfig::default(),
            secrets: SecretsConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency.worker_slots == 0 {
            return Err(ConfigError::ValidationError(
                "concurrency.worker_slots must be at least 1".to_string(),
            ));
        }
        if self.dedupe.window_minutes < 0 {
            return Err(ConfigError::ValidationError(
                "dedupe.window_minutes must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Database connection and pool sizing. The connection string itself is
/// usually a secret reference (`env://DATABASE_URL`, `aws-sm://...`)
/// resolved by `nf-secrets`, not a literal value in the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url_secret_ref: String,
    pub pool_max_size: u32,
    pub connect_timeout_secs: u64,
    /// Attempts for the startup connectivity probe (`SELECT 1`).
    pub startup_probe_attempts: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_secret_ref: "env://DATABASE_URL".to_string(),
            pool_max_size: 10,
            connect_timeout_secs: 10,
            startup_probe_attempts: 3,
        }
    }
}

/// Topic/subscription naming and the SQS-specific knobs the Messaging
/// Gateway needs when `queue.backend = "sqs"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub backend: String,
    pub project_id: String,
    pub subscription_name: String,
    pub dlq_topic: String,
    pub email_immediate_topic: String,
    pub email_daily_topic: String,
    pub realtime_topic: String,
    pub sqs: SqsConfig,
    /// Delay before attempting a subscription reinitialization after a
    /// transport failure.
    pub reinit_delay_secs: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            backend: "sqs".to_string(),
            project_id: String::new(),
            subscription_name: String::new(),
            dlq_topic: "notifications-dlq".to_string(),
            email_immediate_topic: "notifications-email-immediate".to_string(),
            email_daily_topic: "notifications-email-daily".to_string(),
            realtime_topic: "notifications-realtime".to_string(),
            sqs: SqsConfig::default(),
            reinit_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    pub region: String,
    pub wait_time_seconds: i32,
    pub visibility_timeout_seconds: i32,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            wait_time_seconds: 5,
            visibility_timeout_seconds: 60,
        }
    }
}

/// Deduplication window for logically-identical notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    pub window_minutes: i64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self { window_minutes: 60 }
    }
}

/// Shared retry/backoff caps. Individual call sites (DB queries, processor
/// persistence, side-channel publishes) may use a subset of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub db_max_attempts: u32,
    pub pubsub_max_attempts: u32,
    pub processor_max_attempts: u32,
    pub initial_delay_ms: u64,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            db_max_attempts: 3,
            pubsub_max_attempts: 2,
            processor_max_attempts: 3,
            initial_delay_ms: 1000,
            factor: 2.0,
        }
    }
}

/// Per-task concurrency and timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub worker_slots: u32,
    pub task_deadline_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            worker_slots: 2,
            task_deadline_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

/// HTTP diagnostics surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub provider: String,
    pub encryption_key_secret_ref: Option<String>,
    pub data_dir: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            provider: "env".to_string(),
            encryption_key_secret_ref: None,
            data_dir: "./data/secrets".to_string(),
        }
    }
}
