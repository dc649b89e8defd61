//! Environment variable secrets provider.

use crate::{Provider, SecretsError};
use async_trait::async_trait;
use std::env;

pub struct EnvProvider {
    prefix: String,
}

impl EnvProvider {
    pub fn new() -> Self {
        Self {
            prefix: "NOTIFY_SECRET_".to_string(),
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.to_uppercase().replace('-', "_").replace('.', "_")
        )
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for EnvProvider {
    async fn get(&self, key: &str) -> Result<String, SecretsError> {
        let env_key = self.env_key(key);
        env::var(&env_key).map_err(|_| SecretsError::NotFound(key.to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), SecretsError> {
        Err(SecretsError::ProviderError(
            "cannot set environment variables at runtime".to_string(),
        ))
    }

    async fn delete(&self, _key: &str) -> Result<(), SecretsError> {
        Err(SecretsError::ProviderError(
            "cannot delete environment variables at runtime".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_prefixed_uppercase_key() {
        std::env::set_var("NOTIFY_SECRET_DATABASE_URL", "postgres://x");
        let provider = EnvProvider::new();
        let value = provider.get("database-url").await.unwrap();
        assert_eq!(value, "postgres://x");
        std::env::remove_var("NOTIFY_SECRET_DATABASE_URL");
    }

    #[tokio::test]
    async fn missing_key_returns_not_found() {
        let provider = EnvProvider::new();
        assert!(provider.get("totally-unset-key").await.is_err());
    }

    #[tokio::test]
    async fn set_and_delete_are_rejected() {
        let provider = EnvProvider::new();
        assert!(provider.set("k", "v").await.is_err());
        assert!(provider.delete("k").await.is_err());
    }
}
