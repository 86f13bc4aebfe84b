//! Wire types shared by the edge gateway and the mail relay.
//!
//! A submission travels twice: first from the browser to the gateway as a
//! [`ContactFormSubmission`], then from the gateway to the relay as a
//! [`ForwardedSubmission`]. Both hops answer with a [`Reply`].

mod reply;
mod submission;

pub use reply::Reply;
pub use submission::{
    ContactFields, ContactFormSubmission, ForwardedSubmission, ValidatedContact, ValidationError,
    MAX_MESSAGE_LENGTH, PLACEHOLDER,
};
