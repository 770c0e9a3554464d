//! # Message Envelopes
//!
//! The immutable inbound delivery handed to the execution engine.

use crate::messaging::properties::Properties;
use serde::{Deserialize, Serialize};

/// Inbound delivery from the broker.
///
/// Immutable once delivered; the engine owns it for the duration of one
/// execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the connection the message was delivered on
    pub connection: String,
    /// Broker-assigned delivery tag
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: Properties,
    /// Raw body exactly as delivered
    pub body: Vec<u8>,
}

impl Message {
    /// Create a new message with default properties
    pub fn new(
        connection: impl Into<String>,
        delivery_tag: u64,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            connection: connection.into(),
            delivery_tag,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            redelivered: false,
            properties: Properties::default(),
            body: body.into(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    /// Lower-cased `content-type`, `None` when unset or empty
    pub fn content_type(&self) -> Option<String> {
        normalized(self.properties.content_type.as_deref())
    }

    /// Lower-cased `content-encoding`, `None` when unset or empty
    pub fn content_encoding(&self) -> Option<String> {
        normalized(self.properties.content_encoding.as_deref())
    }

    /// One-line description used in log output
    pub fn info(&self) -> String {
        crate::utils::message_info(&self.exchange, &self.routing_key, &self.properties)
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}
