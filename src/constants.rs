//! # Harness Constants
//!
//! Wire-level header names, default exchange names and content negotiation
//! constants shared by the execution engine, the dead-letter policy and the
//! content negotiation engine.
//!
//! Header names are part of the interoperability contract with the
//! dead-lettering infrastructure and must not change.

use std::time::Duration;

/// Message header names written and read by the harness
pub mod headers {
    /// Integer counter incremented on every republish to the error exchange
    pub const PROCESSING_EXCEPTIONS: &str = "Processing-Exceptions";
    /// Metric or error name of the last processing error
    pub const PROCESSING_EXCEPTION: &str = "Processing-Exception";
    /// Name of the consumer that dropped the message
    pub const DROPPED_BY: &str = "Dropped-By";
    /// Human readable reason for the drop
    pub const DROPPED_REASON: &str = "Dropped-Reason";
    /// UTC ISO-8601 timestamp of the drop
    pub const DROPPED_TIMESTAMP: &str = "Dropped-Timestamp";
    /// Exchange the message was originally published to
    pub const ORIGINAL_EXCHANGE: &str = "Original-Exchange";
}

/// Exchange defaults
pub mod exchanges {
    /// Exchange processing errors are republished to unless configured otherwise
    pub const DEFAULT_ERROR_EXCHANGE: &str = "errors";
}

/// Measurement keys and tags recorded by the engine
pub mod measurements {
    /// Default duration key for the age of an inbound message
    pub const DEFAULT_MESSAGE_AGE_KEY: &str = "message_age";
    /// Tag holding the error kind name of a caught error
    pub const EXCEPTION_TAG: &str = "exception";
    /// Tag holding the metric attached to a caught error
    pub const ERROR_TAG: &str = "error";
    /// Prefix for publish timings (`publish.<exchange>.<routing_key>`)
    pub const PUBLISH_PREFIX: &str = "publish";
}

/// Content negotiation constants
pub mod content {
    /// Content types that are intentionally never decoded and never warned about
    pub const IGNORED_TYPES: [&str; 2] = ["application/octet-stream", "text/plain"];
    /// Charset used when a content type does not declare one
    pub const DEFAULT_CHARSET: &str = "utf-8";
}

/// Broker status used when publishing over a connection that is not usable
pub const NOT_CONNECTED_CODE: u16 = 599;
pub const NOT_CONNECTED_TEXT: &str = "NOT_CONNECTED";

/// Upper bound of the voluntary yield offered to long running consumers
pub const YIELD_INTERVAL: Duration = Duration::from_millis(1);

/// Sentinel used for the error tag when a processing error carries no metric
pub const UNNAMED_PROCESSING_ERROR: &str = "ProcessingException";
