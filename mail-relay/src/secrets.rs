use async_trait::async_trait;
use aws_config::BehaviorVersion;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, SecretError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Missing secret {0}")]
    Missing(String),
    #[error("Secrets backend error: {0}")]
    Backend(#[from] aws_sdk_secretsmanager::Error),
    #[error("Malformed secret {name}: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// SMTP login, stored as a JSON secret.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SmtpCredentials {
    #[serde(rename = "SMTP_USERNAME")]
    pub username: String,
    #[serde(rename = "SMTP_PASSWORD")]
    pub password: String,
}

impl SmtpCredentials {
    /// Reads `SMTP_USERNAME` and `SMTP_PASSWORD`, if both are set.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            username: std::env::var("SMTP_USERNAME").ok()?,
            password: std::env::var("SMTP_PASSWORD").ok()?,
        })
    }
}

pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

impl AwsSecretsManagerSecretRepository {
    pub async fn open() -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(url) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        Self(aws_sdk_secretsmanager::Client::new(&config))
    }
}

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, SecretError> {
        let secret = self
            .0
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(aws_sdk_secretsmanager::Error::from)?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(SecretError::Missing(name.into()));
        };
        parse_secret(name, secret_value)
    }
}

/// Secrets held in process memory, keyed by name. Used when credentials are
/// supplied through the environment rather than AWS Secrets Manager.
#[derive(Default, Clone)]
pub struct InMemorySecretRepository(HashMap<String, String>);

impl InMemorySecretRepository {
    pub fn with_smtp_credentials(name: &str, credentials: &SmtpCredentials) -> Self {
        let mut repository = Self::default();
        repository.add_secret(
            name,
            serde_json::to_string(credentials).unwrap_or_default(),
        );
        repository
    }

    pub fn add_secret(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

#[async_trait]
impl SecretRepository for InMemorySecretRepository {
    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, SecretError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| SecretError::Missing(name.into()))?;
        parse_secret(name, value)
    }
}

fn parse_secret<T: DeserializeOwned>(name: &str, value: &str) -> Result<T, SecretError> {
    serde_json::from_str(value).map_err(|source| SecretError::Malformed {
        name: name.into(),
        source,
    })
}
