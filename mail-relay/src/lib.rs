//! Privileged half of the contact form: checks the shared secret, then emails
//! the submission to the site owner.

pub mod config;
mod error;
mod handler;
mod notification;
pub mod secrets;

pub use config::RelayConfig;
pub use error::RelayError;
pub use handler::MailRelay;
