use crate::{cors::AllowedOrigins, turnstile::TURNSTILE_VERIFY_URL};
use anyhow::anyhow;

/// Settings fixed for the lifetime of the gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub relay_url: String,
    /// Sent to the relay with every submission. Never taken from client input.
    pub shared_secret: String,
    /// Captcha verification is skipped entirely when this is `None`.
    pub turnstile: Option<TurnstileConfig>,
    pub allowed_origins: AllowedOrigins,
}

#[derive(Debug, Clone)]
pub struct TurnstileConfig {
    pub secret: String,
    pub verify_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let relay_url = non_empty("RELAY_URL")
            .or_else(|| non_empty("SCRIPT_URL"))
            .ok_or_else(|| anyhow!("Missing required environment variable RELAY_URL"))?;
        let shared_secret = non_empty("FORM_SHARED_SECRET")
            .ok_or_else(|| anyhow!("Missing required environment variable FORM_SHARED_SECRET"))?;
        let turnstile = non_empty("TURNSTILE_SECRET").map(|secret| TurnstileConfig {
            secret,
            verify_url: non_empty("TURNSTILE_VERIFY_URL")
                .unwrap_or_else(|| TURNSTILE_VERIFY_URL.into()),
        });
        let allowed_origins = non_empty("ALLOWED_ORIGINS")
            .map(|raw| AllowedOrigins::parse(&raw))
            .unwrap_or_default();
        Ok(Self {
            relay_url,
            shared_secret,
            turnstile,
            allowed_origins,
        })
    }
}
