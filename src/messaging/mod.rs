//! # Messaging Module
//!
//! Data carried through an execution: the inbound [`Message`], its
//! [`Properties`] and the per-message [`Measurement`].

pub mod measurement;
pub mod message;
pub mod properties;

pub use measurement::{DurationGuard, Measurement};
pub use message::Message;
pub use properties::{HeaderValue, Headers, Properties};
