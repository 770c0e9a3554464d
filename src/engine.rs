//! # Execution Engine
//!
//! Drives one message at a time through the consumer lifecycle:
//!
//! 1. build a fresh [`MessageContext`] (decoded body cache, finished flag)
//! 2. record the message age when a timestamp is present
//! 3. resolve the correlation id and hand it to the delivering connection
//! 4. drop or reject messages of an unaccepted type
//! 5. drop poison messages that reached the retry maximum
//! 6. `prepare`, then `process` unless the message was finished
//! 7. map any error to an [`Outcome`], republishing processing errors; a
//!    panic in `prepare` or `process` counts as an unhandled error
//! 8. run the finish hook exactly once
//! 9. on success, clear tracked confirmations and return `ACK`
//!
//! No error escapes [`ExecutionEngine::execute`]; every path yields exactly
//! one outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::codec::{ContentCodec, ContentNegotiator};
use crate::config::ConsumerConfig;
use crate::confirmation::ConfirmationTracker;
use crate::connection::{BrokerConnection, ConnectionRegistry, PublishRequest};
use crate::constants::measurements::{ERROR_TAG, EXCEPTION_TAG};
use crate::constants::UNNAMED_PROCESSING_ERROR;
use crate::consumer::Consumer;
use crate::context::MessageContext;
use crate::error::{ConsumerError, ConsumerResult, ErrorKind};
use crate::logging::{log_error, log_message_operation};
use crate::messaging::{Measurement, Message, Properties};
use crate::outcome::Outcome;
use crate::reporting::{ErrorContext, ErrorReporter};
use crate::retry;

/// State shared by the engine and every [`MessageContext`]
#[derive(Debug)]
pub struct EngineShared {
    pub(crate) config: ConsumerConfig,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) tracker: Arc<ConfirmationTracker>,
    pub(crate) codec: Option<Arc<dyn ContentCodec>>,
}

/// Outcome of one execution plus the measurement collected during it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub measurement: Measurement,
}

pub struct ExecutionEngine<C: Consumer> {
    consumer: C,
    shared: EngineShared,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl<C: Consumer> ExecutionEngine<C> {
    /// Engine without content negotiation; bodies are handed to the
    /// consumer as raw bytes
    pub fn new(consumer: C, config: ConsumerConfig) -> Self {
        Self {
            consumer,
            shared: EngineShared {
                config,
                connections: ConnectionRegistry::new(),
                tracker: Arc::new(ConfirmationTracker::new()),
                codec: None,
            },
            reporter: None,
        }
    }

    /// Decode and encode bodies through the standard [`ContentNegotiator`]
    pub fn with_content_negotiation(self) -> Self {
        self.with_codec(Arc::new(ContentNegotiator::new()))
    }

    pub fn with_codec(mut self, codec: Arc<dyn ContentCodec>) -> Self {
        self.shared.codec = Some(codec);
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Validate the configuration and initialize the consumer
    pub async fn initialize(&mut self) -> ConsumerResult<()> {
        self.shared.config.validate()?;
        self.consumer.initialize(&self.shared.config).await?;
        info!(
            consumer = %self.name(),
            handler = self.consumer.name(),
            "✅ Consumer initialized"
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.shared.config
    }

    pub fn confirmation_tracker(&self) -> &Arc<ConfirmationTracker> {
        &self.shared.tracker
    }

    /// The configured error reporter, if any
    pub fn error_reporter(&self) -> Option<&Arc<dyn ErrorReporter>> {
        self.reporter.as_ref()
    }

    pub fn set_connection(&self, connection: Arc<dyn BrokerConnection>) {
        debug!(consumer = %self.name(), connection = connection.name(), "connection assigned");
        self.shared.connections.insert(connection);
    }

    /// Remove a connection and abandon its pending confirmations
    pub fn remove_connection(&self, name: &str) -> Option<Arc<dyn BrokerConnection>> {
        self.shared.tracker.clear(name);
        self.shared.connections.remove(name)
    }

    /// Feed a publisher confirmation frame from the broker client
    pub fn on_confirmation(&self, connection: &str, sequence: u64, ack: bool, multiple: bool) -> usize {
        self.shared.tracker.resolve(connection, sequence, ack, multiple)
    }

    /// Feed a basic.return frame for a tracked publish
    pub fn on_return(&self, connection: &str, sequence: u64) -> bool {
        self.shared.tracker.mark_returned(connection, sequence)
    }

    /// Abandon pending confirmations of a connection that went away
    pub fn on_connection_lost(&self, connection: &str) -> usize {
        warn!(consumer = %self.name(), connection, "connection lost, abandoning pending confirmations");
        self.shared.tracker.clear(connection)
    }

    pub async fn on_blocked(&self, connection: &str) {
        self.consumer.on_blocked(connection).await;
    }

    pub async fn on_unblocked(&self, connection: &str) {
        self.consumer.on_unblocked(connection).await;
    }

    /// Shut the consumer down and abandon everything still pending
    pub async fn shutdown(&self) {
        info!(consumer = %self.name(), "🛑 Shutting down consumer");
        self.consumer.shutdown().await;
        for name in self.shared.connections.names() {
            self.shared.tracker.clear(&name);
        }
    }

    /// Execute one message and return its outcome with the collected
    /// measurement
    pub async fn execute(&self, message: Message, mut measurement: Measurement) -> ExecutionResult {
        if let Some(timestamp) = message.properties.timestamp {
            let age = (Utc::now() - timestamp).num_milliseconds() as f64 / 1000.0;
            if age > 0.0 {
                measurement.add_duration(
                    self.consumer.message_age_key(&message, &self.shared.config),
                    age,
                );
            }
        }

        let correlation_id = message
            .properties
            .correlation_id
            .clone()
            .or_else(|| message.properties.message_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(connection) = self.shared.connections.get(&message.connection) {
            connection.set_correlation_id(&correlation_id);
        }

        let span = info_span!(
            "message",
            consumer = %self.name(),
            handler = self.consumer.name(),
            correlation_id = %correlation_id,
            delivery_tag = message.delivery_tag
        );
        let ctx = MessageContext::new(message, measurement, correlation_id, &self.shared);
        let (outcome, measurement) = self.run(ctx).instrument(span).await;

        debug!(consumer = %self.name(), outcome = %outcome, "execution complete");
        ExecutionResult {
            outcome,
            measurement,
        }
    }

    async fn run(&self, mut ctx: MessageContext<'_>) -> (Outcome, Measurement) {
        debug!(info = %ctx.message().info(), "received message");

        if let Some(outcome) = self.filter(&ctx).await {
            return (outcome, ctx.into_measurement());
        }

        let result = match AssertUnwindSafe(self.invoke(&mut ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(panic_error(panic.as_ref())),
        };
        let outcome = match result {
            Ok(()) => Outcome::Ack,
            Err(error) => self.handle_error(&mut ctx, error).await,
        };

        if !ctx.is_finished() {
            ctx.finish();
        }
        self.consumer.on_finish(&mut ctx).await;

        if outcome == Outcome::Ack {
            for name in self.shared.connections.names() {
                self.shared.tracker.clear(&name);
            }
            log_message_operation(
                "execute",
                self.name(),
                Some(ctx.correlation_id()),
                Some(ctx.message().delivery_tag),
                outcome.as_str(),
                None,
            );
        }
        (outcome, ctx.into_measurement())
    }

    async fn invoke(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        self.consumer.prepare(ctx).await?;
        if ctx.is_finished() {
            debug!("message finished in prepare, skipping process");
            return Ok(());
        }
        self.consumer.process(ctx).await
    }

    /// Message type and poison message checks; `Some` short-circuits
    /// execution without invoking user code
    async fn filter(&self, ctx: &MessageContext<'_>) -> Option<Outcome> {
        let config = &self.shared.config;
        let message = ctx.message();

        if let Some(filter) = &config.message_type {
            if !filter.accepts(message.properties.message_type.as_deref()) {
                warn!(
                    message_type = ?message.properties.message_type,
                    "received unsupported message type"
                );
                if config.drop_invalid_messages {
                    self.republish_dropped(message, "invalid type").await;
                    return Some(Outcome::Drop);
                }
                return Some(Outcome::MessageException);
            }
        }

        if let Some(max_retries) = config.error_max_retries {
            if retry::exceeds_max_retries(&message.properties, max_retries) {
                let count = retry::retry_count(&message.properties).unwrap_or_default();
                warn!(
                    retries = count,
                    "dropping message due to error_max_retries"
                );
                self.republish_dropped(message, &format!("max retries ({count})"))
                    .await;
                return Some(Outcome::Drop);
            }
        }
        None
    }

    async fn handle_error(&self, ctx: &mut MessageContext<'_>, error: ConsumerError) -> Outcome {
        let kind = error.kind();
        let outcome = Outcome::from(kind);
        let delivery_tag = ctx.message().delivery_tag;

        match kind {
            ErrorKind::Broker => error!(delivery_tag, %error, "broker error while processing"),
            ErrorKind::Message => info!(delivery_tag, %error, "message error while processing"),
            ErrorKind::Processing => warn!(delivery_tag, %error, "processing error while processing"),
            _ => error!(delivery_tag, kind = %kind, %error, "error while processing"),
        }

        let measurement = ctx.measurement_mut();
        measurement.set_tag(EXCEPTION_TAG, kind.tag());
        if let Some(metric) = error.metric() {
            measurement.set_tag(ERROR_TAG, metric);
        }

        if kind == ErrorKind::Processing {
            let tag = error.metric().unwrap_or(UNNAMED_PROCESSING_ERROR);
            let properties = retry::processing_error_properties(ctx.message(), Some(tag));
            self.republish(ctx.message(), &self.shared.config.error_exchange, properties)
                .await;
        }

        if let Some(reporter) = &self.reporter {
            let message = ctx.message();
            reporter.report(
                &error,
                &ErrorContext {
                    consumer: self.name(),
                    connection: &message.connection,
                    correlation_id: ctx.correlation_id(),
                    delivery_tag,
                    exchange: &message.exchange,
                    routing_key: &message.routing_key,
                    outcome,
                },
            );
        }
        outcome
    }

    async fn republish_dropped(&self, message: &Message, reason: &str) {
        let Some(exchange) = &self.shared.config.drop_exchange else {
            debug!(reason, "no drop exchange configured, discarding message");
            return;
        };
        let properties = retry::dropped_properties(message, self.name(), reason, Utc::now());
        self.republish(message, exchange, properties).await;
    }

    /// Republish the original body on the delivering connection. Failures
    /// are logged; the outcome of the message is already decided.
    async fn republish(&self, message: &Message, exchange: &str, properties: Properties) {
        debug!(exchange, routing_key = %message.routing_key, "republishing message");
        let result = match self.shared.connections.publish_connection(&message.connection) {
            Ok(connection) => connection
                .publish(PublishRequest {
                    exchange: exchange.to_string(),
                    routing_key: message.routing_key.clone(),
                    properties,
                    body: message.body.clone(),
                    mandatory: false,
                })
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            log_error(
                self.name(),
                "republish",
                &err.to_string(),
                Some(&format!("exchange={exchange}")),
            );
        }
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> ConsumerError {
    let reason = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    ConsumerError::Unhandled(anyhow::anyhow!("consumer panicked: {reason}"))
}

impl<C: Consumer + std::fmt::Debug> std::fmt::Debug for ExecutionEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("consumer", &self.consumer)
            .field("shared", &self.shared)
            .finish()
    }
}
