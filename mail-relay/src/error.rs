use crate::secrets::SecretError;
use contact_form::{Reply, ValidationError};
use tracing::{error, warn};

/// Every way a relay request can fail. Each one ends up as
/// `{ok: false, error}` in the reply.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Missing body")]
    MissingBody,
    #[error("{0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Never includes the submitted address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(#[source] lettre::address::AddressError),
    #[error("Error rendering message: {0}")]
    Render(#[from] tinytemplate::error::Error),
    #[error("Error building message: {0}")]
    Compose(#[from] lettre::error::Error),
    #[error("Unable to retrieve SMTP credentials: {0}")]
    Credentials(#[from] SecretError),
    #[error("Unable to set up SMTP transport: {0}")]
    Transport(#[source] lettre::transport::smtp::Error),
    #[error("Error sending message: {0}")]
    Send(#[source] lettre::transport::smtp::Error),
}

impl RelayError {
    fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::MethodNotAllowed
                | RelayError::MissingBody
                | RelayError::InvalidPayload(_)
                | RelayError::Unauthorized
                | RelayError::Invalid(_)
        )
    }

    pub fn log(&self) {
        if self.is_client_error() {
            warn!("Rejected relay request: {self}");
        } else {
            error!("Internal error relaying contact form message: {self}");
        }
    }

    pub fn into_reply(self) -> Reply {
        Reply::failure(self.to_string())
    }
}
