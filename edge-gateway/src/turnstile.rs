use crate::config::TurnstileConfig;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Checks Cloudflare Turnstile tokens against the siteverify API.
///
/// There is no fail-open path: any problem reaching or understanding the
/// verifier counts as a failed verification.
pub struct TurnstileVerifier {
    client: Client,
    config: TurnstileConfig,
}

impl TurnstileVerifier {
    pub fn new(client: Client, config: TurnstileConfig) -> Self {
        Self { client, config }
    }

    pub async fn verify_token(&self, token: &str, remote_ip: &str) -> Result<(), TurnstileError> {
        let payload = TurnstileVerifyPayload {
            secret: &self.config.secret,
            response: token,
            remoteip: remote_ip,
        };
        let response = self.send_token(&payload).await?;
        Self::process_response(response).await
    }

    async fn send_token(
        &self,
        payload: &TurnstileVerifyPayload<'_>,
    ) -> Result<Response, TurnstileError> {
        self.client
            .post(&self.config.verify_url)
            .form(payload)
            .send()
            .await
            .map_err(TurnstileError::Unreachable)
    }

    async fn process_response(response: Response) -> Result<(), TurnstileError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TurnstileError::UnexpectedStatus(status));
        }
        let body: TurnstileResponse = response
            .json()
            .await
            .map_err(TurnstileError::InvalidResponse)?;
        if body.success {
            Ok(())
        } else {
            if body.error_codes.iter().any(|code| code.contains("secret")) {
                warn!("Turnstile rejected the configured secret: {:?}", body.error_codes);
            }
            Err(TurnstileError::TokenRejected(body.error_codes))
        }
    }
}

#[derive(Serialize)]
struct TurnstileVerifyPayload<'a> {
    secret: &'a str,
    response: &'a str,
    remoteip: &'a str,
}

#[derive(Deserialize)]
struct TurnstileResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    #[error("Could not reach Turnstile: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("Turnstile answered with status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("Unreadable Turnstile response: {0}")]
    InvalidResponse(#[source] reqwest::Error),
    #[error("Turnstile rejected the token: {0:?}")]
    TokenRejected(Vec<String>),
}
