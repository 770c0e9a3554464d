//! # Execution Outcomes
//!
//! The single value produced for every executed message. The broker-client
//! dispatch loop uses it to acknowledge or reject the delivery and to decide
//! whether the consumer keeps running.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Result of executing one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Processed successfully
    Ack,
    /// Filtered out (invalid type or poison message) without invoking user code
    Drop,
    MessageException,
    ConsumerException,
    ConfigurationException,
    ProcessingException,
    UnhandledException,
    BrokerException,
}

/// Broker action the caller should take for an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ack => "ACK",
            Outcome::Drop => "DROP",
            Outcome::MessageException => "MESSAGE_EXCEPTION",
            Outcome::ConsumerException => "CONSUMER_EXCEPTION",
            Outcome::ConfigurationException => "CONFIGURATION_EXCEPTION",
            Outcome::ProcessingException => "PROCESSING_EXCEPTION",
            Outcome::UnhandledException => "UNHANDLED_EXCEPTION",
            Outcome::BrokerException => "BROKER_EXCEPTION",
        }
    }

    /// Whether the outcome represents a caught error
    pub fn is_error(&self) -> bool {
        !matches!(self, Outcome::Ack | Outcome::Drop)
    }

    /// Broker acknowledgement semantics for this outcome.
    ///
    /// Message and processing errors are never requeued: the former are bad
    /// input, the latter were already republished to the error exchange.
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Ack | Outcome::Drop => Disposition::Ack,
            Outcome::MessageException | Outcome::ProcessingException => {
                Disposition::Reject { requeue: false }
            }
            Outcome::ConsumerException
            | Outcome::ConfigurationException
            | Outcome::UnhandledException
            | Outcome::BrokerException => Disposition::Reject { requeue: true },
        }
    }

    /// Whether the supervisor should stop the consumer after this outcome
    pub fn stops_consumer(&self) -> bool {
        matches!(
            self,
            Outcome::ConfigurationException | Outcome::ConsumerException
        )
    }
}

impl From<ErrorKind> for Outcome {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Configuration => Outcome::ConfigurationException,
            ErrorKind::Consumer => Outcome::ConsumerException,
            ErrorKind::Message => Outcome::MessageException,
            ErrorKind::Processing => Outcome::ProcessingException,
            ErrorKind::Broker => Outcome::BrokerException,
            ErrorKind::NotImplemented | ErrorKind::InvalidInput | ErrorKind::Unhandled => {
                Outcome::UnhandledException
            }
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
