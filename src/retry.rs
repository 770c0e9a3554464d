//! # Retry and Dead-Letter Policy
//!
//! Poison-message detection and the property rewrites applied when a
//! message is republished to the drop or error exchange. The rewrites are
//! pure; the engine performs the actual publish on the delivering
//! connection.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::constants::headers::{
    DROPPED_BY, DROPPED_REASON, DROPPED_TIMESTAMP, ORIGINAL_EXCHANGE, PROCESSING_EXCEPTION,
    PROCESSING_EXCEPTIONS,
};
use crate::messaging::{HeaderValue, Message, Properties};

/// Current value of the retry counter header
pub fn retry_count(properties: &Properties) -> Option<i64> {
    properties
        .header(PROCESSING_EXCEPTIONS)
        .and_then(HeaderValue::as_i64)
}

/// Whether the message has been retried `max_retries` times or more
pub fn exceeds_max_retries(properties: &Properties, max_retries: u32) -> bool {
    match properties.header(PROCESSING_EXCEPTIONS) {
        None => false,
        Some(value) => match value.as_i64() {
            Some(count) => count >= i64::from(max_retries),
            None => {
                warn!(header = PROCESSING_EXCEPTIONS, value = ?value, "ignoring non-integer retry counter");
                false
            }
        },
    }
}

/// Properties for republishing a dropped message to the drop exchange
pub fn dropped_properties(
    message: &Message,
    consumer: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Properties {
    let mut properties = message.properties.clone();
    let headers = &mut properties.headers;
    headers.insert(DROPPED_BY.to_string(), consumer.into());
    headers.insert(DROPPED_REASON.to_string(), reason.into());
    headers.insert(
        DROPPED_TIMESTAMP.to_string(),
        now.to_rfc3339_opts(SecondsFormat::Micros, true).into(),
    );
    headers.insert(
        ORIGINAL_EXCHANGE.to_string(),
        message.exchange.as_str().into(),
    );
    properties
}

/// Properties for republishing a failed message to the error exchange.
///
/// The counter starts at 1; a value that is not an integer also restarts
/// at 1.
pub fn processing_error_properties(message: &Message, error: Option<&str>) -> Properties {
    let mut properties = message.properties.clone();
    let headers = &mut properties.headers;
    if let Some(error) = error.filter(|e| !e.is_empty()) {
        headers.insert(PROCESSING_EXCEPTION.to_string(), error.into());
    }

    let count = match headers.get(PROCESSING_EXCEPTIONS) {
        None => 1,
        Some(value) => match value.as_i64() {
            Some(count) => count.saturating_add(1),
            None => {
                warn!(
                    header = PROCESSING_EXCEPTIONS,
                    value = ?value,
                    "retry counter is not an integer, resetting to 1"
                );
                1
            }
        },
    };
    headers.insert(PROCESSING_EXCEPTIONS.to_string(), HeaderValue::Int(count));
    properties
}
