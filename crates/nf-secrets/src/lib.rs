//! Secret storage backends for the notification worker.
//!
//! Provides a unified interface for secret storage with two backends:
//! environment variables (default) and AES-256-GCM encrypted local file
//! storage. Configuration values that need a secret (most notably the
//! database connection string) carry a *reference* rather than a literal
//! value — `env://DATABASE_URL` or `encrypted://database-url` — resolved
//! through [`resolve_reference`] at startup.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

mod encrypted;
mod env;

pub use encrypted::{generate_key, EncryptedProvider};
pub use env::EnvProvider;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("invalid key format: {0}")]
    InvalidKey(String),
    #[error("encryption error: {0}")]
    EncryptionError(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Configuration for constructing a secrets provider.
#[derive(Debug, Clone)]
pub struct SecretsConfig {
    pub provider: String,
    pub encryption_key: Option<String>,
    pub data_dir: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            provider: "env".to_string(),
            encryption_key: None,
            data_dir: PathBuf::from("./data/secrets"),
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn get(&self, key: &str) -> Result<String, SecretsError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), SecretsError>;
    async fn delete(&self, key: &str) -> Result<(), SecretsError>;
    fn name(&self) -> &str;
}

pub async fn create_provider(config: &SecretsConfig) -> Result<Arc<dyn Provider>, SecretsError> {
    match config.provider.as_str() {
        "env" => {
            info!("using environment variable secrets provider");
            Ok(Arc::new(EnvProvider::new()))
        }
        "encrypted" => {
            let key = config.encryption_key.as_ref().ok_or_else(|| {
                SecretsError::ProviderError("encryption key required for encrypted provider".to_string())
            })?;
            info!("using encrypted file secrets provider");
            let provider = EncryptedProvider::new(key, &config.data_dir).await?;
            Ok(Arc::new(provider))
        }
        other => Err(SecretsError::ProviderError(format!(
            "unknown secrets provider: {other}"
        ))),
    }
}

/// Resolves a `scheme://key` reference against the given provider.
///
/// `env://KEY` and `encrypted://KEY` both delegate to `provider.get(KEY)` —
/// the scheme names the provider that is expected to own the key, not a
/// different lookup path, so a mismatched scheme (e.g. `env://x` passed to
/// an encrypted-file provider) surfaces as a normal `NotFound`.
pub async fn resolve_reference(provider: &dyn Provider, reference: &str) -> Result<String, SecretsError> {
    let (scheme, key) = reference
        .split_once("://")
        .ok_or_else(|| SecretsError::InvalidKey(format!("not a scheme://key reference: {reference}")))?;

    match scheme {
        "env" | "encrypted" => provider.get(key).await,
        other => Err(SecretsError::InvalidKey(format!(
            "unsupported secret reference scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_reference_rejects_missing_scheme() {
        let provider = EnvProvider::new();
        let err = resolve_reference(&provider, "DATABASE_URL").await.unwrap_err();
        assert!(matches!(err, SecretsError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn create_provider_rejects_unknown_name() {
        let config = SecretsConfig {
            provider: "vault".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).await.is_err());
    }
}
