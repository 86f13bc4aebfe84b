use anyhow::{anyhow, Context};
use lettre::message::Mailbox;

const DEFAULT_SMTP_CREDENTIALS_SECRET: &str = "smtp-credentials";

/// Settings fixed for the lifetime of the relay process.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Must match the secret the edge gateway forwards.
    pub shared_secret: String,
    pub to_mailbox: Mailbox,
    pub from_mailbox: Mailbox,
    pub smtp_url: String,
    /// Name under which SMTP credentials are stored. Only read for `smtps://` URLs.
    pub smtp_credentials_secret: String,
}

impl RelayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("Missing required environment variable {key}"))
        };
        let to_mailbox: Mailbox = required("TO_EMAIL")?
            .parse()
            .context("Invalid TO_EMAIL")?;
        let from_mailbox: Mailbox = required("FROM_EMAIL")?
            .parse()
            .context("Invalid FROM_EMAIL")?;
        Ok(Self {
            shared_secret: required("FORM_SHARED_SECRET")?,
            to_mailbox,
            from_mailbox,
            smtp_url: required("SMTP_URL")?,
            smtp_credentials_secret: lookup("SMTP_CREDENTIALS_SECRET")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_SMTP_CREDENTIALS_SECRET.into()),
        })
    }

    /// Credentials are only sent over TLS.
    pub fn smtp_requires_credentials(&self) -> bool {
        self.smtp_url.starts_with("smtps://")
    }
}
