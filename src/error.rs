//! # Consumer Error Types
//!
//! The error taxonomy raised by user callbacks and by the harness itself.
//! Every variant maps to exactly one [`ErrorKind`], and every kind maps to
//! exactly one [`Outcome`](crate::outcome::Outcome) through a table lookup
//! in [`crate::outcome`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while executing a message
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// A required setting is missing or invalid; the consumer should stop
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        metric: Option<String>,
    },

    /// The consumer itself is unhealthy and the supervisor should stop it
    #[error("Consumer error: {message}")]
    Consumer {
        message: String,
        metric: Option<String>,
    },

    /// The message is bad; reject it without requeueing
    #[error("Message error: {message}")]
    Message {
        message: String,
        metric: Option<String>,
    },

    /// Processing failed in a retryable way; republish to the error exchange
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        metric: Option<String>,
    },

    /// The broker or transport failed while the message was being executed
    #[error("{connection} Error: ({code}) {text}")]
    Broker {
        connection: String,
        code: u16,
        text: String,
    },

    /// A required user extension point was not implemented
    #[error("Not implemented: {operation}")]
    NotImplemented { operation: String },

    /// A harness API was called with arguments it can not act on
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Any other error raised by user code
    #[error("Unhandled error: {0}")]
    Unhandled(#[from] anyhow::Error),
}

/// Fieldless discriminant of [`ConsumerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Consumer,
    Message,
    Processing,
    Broker,
    NotImplemented,
    InvalidInput,
    Unhandled,
}

impl ErrorKind {
    /// Name recorded in the `exception` measurement tag
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationException",
            ErrorKind::Consumer => "ConsumerException",
            ErrorKind::Message => "MessageException",
            ErrorKind::Processing => "ProcessingException",
            ErrorKind::Broker => "BrokerException",
            ErrorKind::NotImplemented => "NotImplementedError",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Unhandled => "UnhandledException",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl ConsumerError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            metric: None,
        }
    }

    /// Create a consumer error
    pub fn consumer(message: impl Into<String>) -> Self {
        Self::Consumer {
            message: message.into(),
            metric: None,
        }
    }

    /// Create a message error
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
            metric: None,
        }
    }

    /// Create a processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
            metric: None,
        }
    }

    /// Create a broker error
    pub fn broker(connection: impl Into<String>, code: u16, text: impl Into<String>) -> Self {
        Self::Broker {
            connection: connection.into(),
            code,
            text: text.into(),
        }
    }

    /// Create a not-implemented error
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Attach a metric name used for auto-instrumentation of the error.
    ///
    /// Variants without a metric slot are returned unchanged.
    pub fn with_metric(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Configuration { metric, .. }
            | Self::Consumer { metric, .. }
            | Self::Message { metric, .. }
            | Self::Processing { metric, .. } => *metric = Some(name.into()),
            _ => {}
        }
        self
    }

    /// The metric attached to this error, if any
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::Configuration { metric, .. }
            | Self::Consumer { metric, .. }
            | Self::Message { metric, .. }
            | Self::Processing { metric, .. } => metric.as_deref(),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Consumer { .. } => ErrorKind::Consumer,
            Self::Message { .. } => ErrorKind::Message,
            Self::Processing { .. } => ErrorKind::Processing,
            Self::Broker { .. } => ErrorKind::Broker,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Unhandled(_) => ErrorKind::Unhandled,
        }
    }
}

impl From<serde_json::Error> for ConsumerError {
    fn from(err: serde_json::Error) -> Self {
        ConsumerError::message(err.to_string()).with_metric("serialization-load")
    }
}

/// Result type alias for user callbacks
pub type ConsumerResult<T> = Result<T, ConsumerError>;
