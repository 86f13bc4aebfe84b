//! Public-facing half of the contact form: CORS, origin screening,
//! validation and optional Turnstile verification in front of the mail
//! relay.

pub mod config;
pub mod cors;
mod error;
mod handler;
mod relay;
mod turnstile;

pub use config::{GatewayConfig, TurnstileConfig};
pub use handler::EdgeGateway;
