//! # Consumer Configuration
//!
//! Per-consumer settings read by the execution engine: exchange routing for
//! dropped and failed messages, the poison-message threshold, the accepted
//! message types and free-form settings handed to user code.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use amqp_harness::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_file("config/consumer.yaml")
//!     .load()?;
//! println!("consumer {} drops to {:?}", config.name, config.drop_exchange);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::constants::{exchanges::DEFAULT_ERROR_EXCHANGE, measurements::DEFAULT_MESSAGE_AGE_KEY};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Accepted message type(s); a single value or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTypeFilter {
    Single(String),
    Many(Vec<String>),
}

impl MessageTypeFilter {
    /// Whether `message_type` is accepted; a missing type never matches
    pub fn accepts(&self, message_type: Option<&str>) -> bool {
        let Some(message_type) = message_type else {
            return false;
        };
        match self {
            MessageTypeFilter::Single(expected) => expected == message_type,
            MessageTypeFilter::Many(expected) => expected.iter().any(|e| e == message_type),
        }
    }
}

impl From<&str> for MessageTypeFilter {
    fn from(value: &str) -> Self {
        MessageTypeFilter::Single(value.to_string())
    }
}

impl From<Vec<&str>> for MessageTypeFilter {
    fn from(values: Vec<&str>) -> Self {
        MessageTypeFilter::Many(values.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Consumer name, used as the default `app_id` and in drop diagnostics
    pub name: String,
    /// Exchange dropped messages are republished to
    pub drop_exchange: Option<String>,
    /// Drop messages whose type is not accepted instead of rejecting them
    pub drop_invalid_messages: bool,
    /// Exchange processing errors are republished to
    pub error_exchange: String,
    /// Drop messages whose `Processing-Exceptions` header reaches this value
    pub error_max_retries: Option<u32>,
    pub message_type: Option<MessageTypeFilter>,
    /// Duration key for the message age measurement
    pub message_age_key: String,
    /// Free-form settings for user code
    pub settings: HashMap<String, serde_json::Value>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "consumer".to_string(),
            drop_exchange: None,
            drop_invalid_messages: false,
            error_exchange: DEFAULT_ERROR_EXCHANGE.to_string(),
            error_max_retries: None,
            message_type: None,
            message_age_key: DEFAULT_MESSAGE_AGE_KEY.to_string(),
            settings: HashMap::new(),
        }
    }
}

impl ConsumerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_drop_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.drop_exchange = Some(exchange.into());
        self
    }

    pub fn with_drop_invalid_messages(mut self, drop: bool) -> Self {
        self.drop_invalid_messages = drop;
        self
    }

    pub fn with_error_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.error_exchange = exchange.into();
        self
    }

    pub fn with_error_max_retries(mut self, max_retries: u32) -> Self {
        self.error_max_retries = Some(max_retries);
        self
    }

    pub fn with_message_type(mut self, filter: impl Into<MessageTypeFilter>) -> Self {
        self.message_type = Some(filter.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "name",
                "consumer configuration",
            ));
        }
        if self.error_exchange.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "error_exchange",
                "",
                "error exchange must not be empty",
            ));
        }
        if let Some(exchange) = &self.drop_exchange {
            if exchange.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "drop_exchange",
                    "",
                    "drop exchange must not be empty when set",
                ));
            }
        }
        if self.error_max_retries == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "error_max_retries",
                "0",
                "must be greater than zero",
            ));
        }
        if self.drop_invalid_messages && self.drop_exchange.is_none() {
            warn!(
                consumer = %self.name,
                "drop_invalid_messages is enabled without a drop_exchange, invalid messages will be discarded"
            );
        }
        Ok(())
    }
}
