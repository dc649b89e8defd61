//! Configuration loader with file and environment variable support.

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "notification-worker.toml",
    "./config/config.toml",
    "/etc/notification-worker/config.toml",
];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("NOTIFY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        if let Ok(val) = env::var("NOTIFY_DATABASE_URL_SECRET_REF") {
            config.database.url_secret_ref = val;
        }
        if let Ok(val) = env::var("NOTIFY_DATABASE_POOL_MAX_SIZE") {
            if let Ok(n) = val.parse() {
                config.database.pool_max_size = n;
            }
        }

        if let Ok(val) = env::var("NOTIFY_PUBSUB_PROJECT_ID") {
            config.pubsub.project_id = val;
        }
        if let Ok(val) = env::var("NOTIFY_PUBSUB_SUBSCRIPTION_NAME") {
            config.pubsub.subscription_name = val;
        }
        if let Ok(val) = env::var("NOTIFY_PUBSUB_DLQ_TOPIC") {
            config.pubsub.dlq_topic = val;
        }
        if let Ok(val) = env::var("NOTIFY_PUBSUB_EMAIL_IMMEDIATE_TOPIC") {
            config.pubsub.email_immediate_topic = val;
        }
        if let Ok(val) = env::var("NOTIFY_PUBSUB_EMAIL_DAILY_TOPIC") {
            config.pubsub.email_daily_topic = val;
        }
        if let Ok(val) = env::var("NOTIFY_PUBSUB_REALTIME_TOPIC") {
            config.pubsub.realtime_topic = val;
        }
        if let Ok(val) = env::var("NOTIFY_PUBSUB_SQS_REGION") {
            config.pubsub.sqs.region = val;
        }

        if let Ok(val) = env::var("NOTIFY_DEDUPE_WINDOW_MINUTES") {
            if let Ok(n) = val.parse() {
                config.dedupe.window_minutes = n;
            }
        }

        if let Ok(val) = env::var("NOTIFY_RETRY_DB_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.retry.db_max_attempts = n;
            }
        }
        if let Ok(val) = env::var("NOTIFY_RETRY_PUBSUB_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.retry.pubsub_max_attempts = n;
            }
        }

        if let Ok(val) = env::var("NOTIFY_CONCURRENCY_WORKER_SLOTS") {
            if let Ok(n) = val.parse() {
                config.concurrency.worker_slots = n;
            }
        }
        if let Ok(val) = env::var("NOTIFY_CONCURRENCY_TASK_DEADLINE_SECS") {
            if let Ok(n) = val.parse() {
                config.concurrency.task_deadline_secs = n;
            }
        }

        if let Ok(val) = env::var("NOTIFY_HTTP_PORT") {
            if let Ok(n) = val.parse() {
                config.http.port = n;
            }
        }
        if let Ok(val) = env::var("NOTIFY_HTTP_HOST") {
            config.http.host = val;
        }

        if let Ok(val) = env::var("NOTIFY_SECRETS_PROVIDER") {
            config.secrets.provider = val;
        }
        if let Ok(val) = env::var("NOTIFY_SECRETS_ENCRYPTION_KEY_REF") {
            config.secrets.encryption_key_secret_ref = Some(val);
        }

        if let Ok(val) = env::var("NOTIFY_LOG_LEVEL") {
            config.log_level = val;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_no_file_present() {
        let loader = ConfigLoader::with_path("/nonexistent/path/config.toml");
        let config = loader.load().expect("defaults should validate");
        assert_eq!(config.concurrency.worker_slots, 2);
        assert_eq!(config.dedupe.window_minutes, 60);
    }

    #[test]
    fn loads_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dedupe]\nwindow_minutes = 15\n").unwrap();

        let loader = ConfigLoader::with_path(file.path());
        let config = loader.load().unwrap();
        assert_eq!(config.dedupe.window_minutes, 15);
    }

    #[test]
    fn rejects_zero_worker_slots() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[concurrency]\nworker_slots = 0\n").unwrap();

        let loader = ConfigLoader::with_path(file.path());
        assert!(loader.load().is_err());
    }
}
