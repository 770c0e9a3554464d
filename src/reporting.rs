//! # Error Reporting
//!
//! Sink for every error caught at the execution boundary. The default
//! [`TracingReporter`] emits a structured error event; supervisors can plug
//! in a reporter that forwards to an external error tracker.

use std::fmt::Debug;

use serde::Serialize;

use crate::error::ConsumerError;
use crate::logging::log_error;
use crate::outcome::Outcome;

/// Where and how an error was caught
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext<'a> {
    pub consumer: &'a str,
    pub connection: &'a str,
    pub correlation_id: &'a str,
    pub delivery_tag: u64,
    pub exchange: &'a str,
    pub routing_key: &'a str,
    pub outcome: Outcome,
}

pub trait ErrorReporter: Send + Sync + Debug {
    fn report(&self, error: &ConsumerError, context: &ErrorContext<'_>);
}

/// Reports errors as `tracing` error events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &ConsumerError, context: &ErrorContext<'_>) {
        let details = serde_json::to_string(context).ok();
        log_error(
            context.consumer,
            "execute",
            &error.to_string(),
            details.as_deref(),
        );
    }
}
