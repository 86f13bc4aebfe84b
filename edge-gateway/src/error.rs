use crate::{relay::RelayFailure, turnstile::TurnstileError};
use contact_form::{Reply, ValidationError};
use lambda_http::http::StatusCode;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Origin not allowed")]
    OriginNotAllowed,
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("Missing captcha token")]
    MissingCaptchaToken,
    #[error("Captcha failed: {0}")]
    CaptchaFailed(#[source] TurnstileError),
    #[error(transparent)]
    Relay(RelayFailure),
    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<RelayFailure> for GatewayError {
    fn from(failure: RelayFailure) -> Self {
        match failure {
            // A request that could not even be built points at our own
            // configuration, not at the relay.
            RelayFailure::Unreachable(error) if error.is_builder() => {
                GatewayError::Internal(error.into())
            }
            failure => GatewayError::Relay(failure),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::OriginNotAllowed | GatewayError::CaptchaFailed(_) => {
                StatusCode::FORBIDDEN
            }
            GatewayError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            GatewayError::Invalid(ValidationError::MissingRequiredFields)
            | GatewayError::MissingCaptchaToken => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Invalid(ValidationError::MessageTooLong) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Relay(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The body sent to the client. Internal detail stays in the logs, except
    /// for whatever the relay itself reported.
    pub fn reply(&self) -> Reply {
        match self {
            GatewayError::InvalidJson(_) => Reply::failure("Invalid JSON"),
            GatewayError::CaptchaFailed(_) => Reply::failure("Captcha failed"),
            GatewayError::Internal(_) => Reply::failure("Internal error"),
            GatewayError::Relay(failure) => {
                let reply = Reply::failure(failure.client_message());
                match failure.upstream() {
                    Some(upstream) => reply.with_upstream(upstream.clone()),
                    None => reply,
                }
            }
            _ => Reply::failure(self.to_string()),
        }
    }

    pub fn log(&self) {
        match self {
            GatewayError::Relay(_) | GatewayError::Internal(_) => error!("Forwarding contact form submission failed: {self}"),
            _ => warn!("Rejected contact form submission: {self}"),
        }
    }
}
