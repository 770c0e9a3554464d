//! # Message Context
//!
//! Per-message view handed to [`Consumer`](crate::consumer::Consumer)
//! hooks. A new context is built for every execution, so nothing a hook
//! stores here survives into the next message.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::codec::{encode_opaque, Body, CodecResult, EncodeOptions};
use crate::confirmation::ConfirmationHandle;
use crate::connection::PublishRequest;
use crate::constants::{measurements::PUBLISH_PREFIX, YIELD_INTERVAL};
use crate::engine::EngineShared;
use crate::error::{ConsumerError, ConsumerResult};
use crate::messaging::{DurationGuard, Headers, Measurement, Message, Properties};
use crate::reply::{reply_properties, reply_target, ReplyOptions};

/// Options for [`MessageContext::publish_message`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Connection to publish on; defaults to the delivering connection
    pub connection: Option<String>,
    /// Skip content-type serialization
    pub no_serialization: bool,
    /// Skip content-encoding compression
    pub no_encoding: bool,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn no_serialization(mut self) -> Self {
        self.no_serialization = true;
        self
    }

    pub fn no_encoding(mut self) -> Self {
        self.no_encoding = true;
        self
    }
}

pub struct MessageContext<'a> {
    message: Message,
    measurement: Measurement,
    correlation_id: String,
    finished: bool,
    body: OnceLock<CodecResult<Body>>,
    shared: &'a EngineShared,
}

impl<'a> MessageContext<'a> {
    pub(crate) fn new(
        message: Message,
        measurement: Measurement,
        correlation_id: String,
        shared: &'a EngineShared,
    ) -> Self {
        Self {
            message,
            measurement,
            correlation_id,
            finished: false,
            body: OnceLock::new(),
            shared,
        }
    }

    pub(crate) fn into_measurement(self) -> Measurement {
        self.measurement
    }

    pub(crate) fn measurement_mut(&mut self) -> &mut Measurement {
        &mut self.measurement
    }

    /// Consumer name from the configuration
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn app_id(&self) -> Option<&str> {
        self.message.properties.app_id.as_deref()
    }

    pub fn content_encoding(&self) -> Option<String> {
        self.message.content_encoding()
    }

    pub fn content_type(&self) -> Option<String> {
        self.message.content_type()
    }

    pub fn exchange(&self) -> &str {
        &self.message.exchange
    }

    pub fn expiration(&self) -> Option<&str> {
        self.message.properties.expiration.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.message.properties.headers
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.properties.message_id.as_deref()
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message.properties.message_type.as_deref()
    }

    pub fn priority(&self) -> Option<u8> {
        self.message.properties.priority
    }

    pub fn properties(&self) -> &Properties {
        &self.message.properties
    }

    pub fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.message.properties.reply_to.as_deref()
    }

    pub fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.message.properties.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.message.properties.user_id.as_deref()
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.message.body
    }

    /// The message body, decompressed and deserialized when a content codec
    /// is configured. Decoded at most once per message.
    pub fn body(&self) -> ConsumerResult<&Body> {
        self.body
            .get_or_init(|| match &self.shared.codec {
                Some(codec) => codec.decode(&self.message),
                None => Ok(Body::Bytes(self.message.body.clone())),
            })
            .as_ref()
            .map_err(|err| ConsumerError::from(err.clone()))
    }

    pub fn settings(&self) -> &HashMap<String, serde_json::Value> {
        &self.shared.config.settings
    }

    /// A setting user code depends on; missing settings are a configuration
    /// error
    pub fn require_setting(&self, name: &str, feature: &str) -> ConsumerResult<&serde_json::Value> {
        self.shared.config.settings.get(name).ok_or_else(|| {
            ConsumerError::configuration(format!(
                "You must define the '{name}' setting in your application to use {feature}"
            ))
        })
    }

    /// Finish processing the current message. Called from `prepare`, it
    /// skips `process`.
    pub fn finish(&mut self) {
        if self.finished {
            warn!(correlation_id = %self.correlation_id, "finish called when already finished");
            return;
        }
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats_add_duration(&mut self, key: impl Into<String>, seconds: f64) {
        self.measurement.add_duration(key, seconds);
    }

    pub fn stats_incr(&mut self, key: impl Into<String>, value: i64) {
        self.measurement.incr(key, value);
    }

    pub fn stats_set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.measurement.set_tag(key, value);
    }

    pub fn stats_set_value(&mut self, key: impl Into<String>, value: f64) {
        self.measurement.set_value(key, value);
    }

    pub fn stats_track_duration(&mut self, key: impl Into<String>) -> DurationGuard<'_> {
        self.measurement.track_duration(key)
    }

    /// Publish a message, serializing and compressing the body according to
    /// its properties when a content codec is configured.
    ///
    /// Returns a confirmation handle when the connection has publisher
    /// confirmations enabled.
    pub async fn publish_message(
        &mut self,
        exchange: &str,
        routing_key: &str,
        properties: Properties,
        body: impl Into<Body>,
        options: PublishOptions,
    ) -> ConsumerResult<Option<ConfirmationHandle>> {
        let name = options
            .connection
            .as_deref()
            .unwrap_or(&self.message.connection);
        let connection = self.shared.connections.publish_connection(name)?;

        let body = body.into();
        let payload = match &self.shared.codec {
            Some(codec) => codec.encode(
                &properties,
                &body,
                EncodeOptions {
                    no_serialization: options.no_serialization,
                    no_encoding: options.no_encoding,
                },
            )?,
            None => encode_opaque(&body)?,
        };

        debug!(
            exchange,
            routing_key,
            connection = connection.name(),
            "📤 Publishing message"
        );
        let in_flight = self.shared.tracker.begin_publish(connection.name());
        let started = Instant::now();
        let sequence = connection
            .publish(PublishRequest {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                properties: properties.clone(),
                body: payload,
                mandatory: connection.publisher_confirmations(),
            })
            .await?;
        self.measurement.add_duration(
            format!("{PUBLISH_PREFIX}.{exchange}.{routing_key}"),
            started.elapsed().as_secs_f64(),
        );

        let handle = self.shared.tracker.register(
            connection.as_ref(),
            sequence,
            exchange,
            routing_key,
            &properties,
        );
        drop(in_flight);
        Ok(handle)
    }

    /// Reply to the message being processed.
    ///
    /// Fails before publishing when neither `options.reply_to` nor the
    /// inbound `reply_to` property is set.
    pub async fn reply(
        &mut self,
        body: impl Into<Body>,
        properties: Properties,
        options: ReplyOptions,
    ) -> ConsumerResult<Option<ConfirmationHandle>> {
        let (exchange, routing_key) = reply_target(&self.message, &options)?;
        let properties = reply_properties(properties, self.name(), &self.message);
        let publish_options = PublishOptions {
            connection: options.connection,
            ..PublishOptions::default()
        };
        self.publish_message(&exchange, &routing_key, properties, body, publish_options)
            .await
    }

    /// Let other tasks on the runtime (such as broker heartbeats) run
    /// during a long loop
    pub async fn yield_to_runtime(&self) {
        tokio::task::yield_now().await;
        tokio::time::sleep(YIELD_INTERVAL).await;
    }
}

impl std::fmt::Debug for MessageContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("consumer", &self.shared.config.name)
            .field("delivery_tag", &self.message.delivery_tag)
            .field("correlation_id", &self.correlation_id)
            .field("finished", &self.finished)
            .finish()
    }
}
