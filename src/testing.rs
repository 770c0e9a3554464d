//! # Consumer Testing
//!
//! In-memory stand-ins for the broker client layer so consumers can be
//! exercised without a broker.
//!
//! [`MockConnection`] records every publish and, when publisher
//! confirmations are enabled, confirms each publish from a spawned task,
//! the way a broker client delivers confirm frames from its I/O task. On
//! a multi-threaded runtime the confirmation may arrive before the
//! publisher has registered the sequence number.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::ConsumerConfig;
use crate::confirmation::ConfirmationTracker;
use crate::connection::{BrokerConnection, PublishRequest};
use crate::constants::{NOT_CONNECTED_CODE, NOT_CONNECTED_TEXT};
use crate::consumer::Consumer;
use crate::engine::{ExecutionEngine, ExecutionResult};
use crate::error::{ConsumerError, ConsumerResult};
use crate::messaging::{HeaderValue, Measurement, Message, Properties};
use crate::outcome::Outcome;

/// Name of the connection created by [`TestHarness`]
pub const MOCK_CONNECTION: &str = "mock";
pub const TEST_EXCHANGE: &str = "rejected";
pub const TEST_ROUTING_KEY: &str = "routing-key";

/// How the broker answers a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishSideEffect {
    /// Confirm with an ack
    #[default]
    Delivered,
    /// Confirm with a nack
    Undelivered,
    /// Return as unroutable, then ack
    Unroutable,
}

type SideEffectFn = dyn Fn(&PublishRequest) -> PublishSideEffect + Send + Sync;

/// A publish captured by [`MockConnection`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub sequence: u64,
    pub exchange: String,
    pub routing_key: String,
    pub properties: Properties,
    pub body: Vec<u8>,
    pub mandatory: bool,
    pub side_effect: PublishSideEffect,
}

impl PublishedMessage {
    pub fn header(&self, key: &str) -> Option<&HeaderValue> {
        self.properties.header(key)
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

pub struct MockConnection {
    name: String,
    connected: AtomicBool,
    channel_open: AtomicBool,
    confirmations: bool,
    sequence: AtomicU64,
    published: Mutex<Vec<PublishedMessage>>,
    correlation_id: Mutex<Option<String>>,
    tracker: Mutex<Option<Arc<ConfirmationTracker>>>,
    side_effect: Mutex<Option<Box<SideEffectFn>>>,
}

impl MockConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(true),
            channel_open: AtomicBool::new(true),
            confirmations: false,
            sequence: AtomicU64::new(0),
            published: Mutex::new(Vec::new()),
            correlation_id: Mutex::new(None),
            tracker: Mutex::new(None),
            side_effect: Mutex::new(None),
        }
    }

    pub fn with_publisher_confirmations(mut self, enabled: bool) -> Self {
        self.confirmations = enabled;
        self
    }

    /// Confirm publishes into `tracker`
    pub fn attach_tracker(&self, tracker: Arc<ConfirmationTracker>) {
        *self.tracker.lock() = Some(tracker);
    }

    /// Decide per publish how the broker answers
    pub fn set_side_effect<F>(&self, side_effect: F)
    where
        F: Fn(&PublishRequest) -> PublishSideEffect + Send + Sync + 'static,
    {
        *self.side_effect.lock() = Some(Box::new(side_effect));
    }

    pub fn clear_side_effect(&self) {
        *self.side_effect.lock() = None;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_channel_open(&self, open: bool) {
        self.channel_open.store(open, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn clear_published(&self) {
        self.published.lock().clear();
    }

    pub fn correlation_id(&self) -> Option<String> {
        self.correlation_id.lock().clone()
    }

    fn confirm(&self, sequence: u64, side_effect: PublishSideEffect) {
        let Some(tracker) = self.tracker.lock().clone() else {
            return;
        };
        let name = self.name.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            match side_effect {
                PublishSideEffect::Delivered => {
                    tracker.resolve(&name, sequence, true, false);
                }
                PublishSideEffect::Undelivered => {
                    tracker.resolve(&name, sequence, false, false);
                }
                PublishSideEffect::Unroutable => {
                    tracker.mark_returned(&name, sequence);
                    tracker.resolve(&name, sequence, true, false);
                }
            }
        });
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("name", &self.name)
            .field("connected", &self.connected)
            .field("confirmations", &self.confirmations)
            .field("published", &self.published.lock().len())
            .finish()
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn channel_is_open(&self) -> bool {
        self.channel_open.load(Ordering::SeqCst)
    }

    fn publisher_confirmations(&self) -> bool {
        self.confirmations
    }

    async fn publish(&self, request: PublishRequest) -> ConsumerResult<u64> {
        if !self.is_connected() {
            return Err(ConsumerError::broker(
                &self.name,
                NOT_CONNECTED_CODE,
                NOT_CONNECTED_TEXT,
            ));
        }
        let side_effect = self
            .side_effect
            .lock()
            .as_ref()
            .map(|f| f(&request))
            .unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.published.lock().push(PublishedMessage {
            sequence,
            exchange: request.exchange,
            routing_key: request.routing_key,
            properties: request.properties,
            body: request.body,
            mandatory: request.mandatory,
            side_effect,
        });
        if self.confirmations {
            self.confirm(sequence, side_effect);
        }
        Ok(sequence)
    }

    fn set_correlation_id(&self, correlation_id: &str) {
        *self.correlation_id.lock() = Some(correlation_id.to_string());
    }
}

/// Wires a consumer to an [`ExecutionEngine`] and a [`MockConnection`]
pub struct TestHarness<C: Consumer> {
    engine: ExecutionEngine<C>,
    connection: Arc<MockConnection>,
    delivery_tag: AtomicU64,
}

impl<C: Consumer> TestHarness<C> {
    pub fn new(consumer: C, config: ConsumerConfig) -> Self {
        Self::with_connection(consumer, config, MockConnection::new(MOCK_CONNECTION))
    }

    /// Harness over a custom connection, e.g. one with confirmations
    pub fn with_connection(consumer: C, config: ConsumerConfig, connection: MockConnection) -> Self {
        Self::from_engine(ExecutionEngine::new(consumer, config), connection)
    }

    /// Harness over a pre-built engine
    pub fn from_engine(engine: ExecutionEngine<C>, connection: MockConnection) -> Self {
        let connection = Arc::new(connection);
        connection.attach_tracker(engine.confirmation_tracker().clone());
        engine.set_connection(connection.clone());
        Self {
            engine,
            connection,
            delivery_tag: AtomicU64::new(0),
        }
    }

    /// Enable the standard content negotiator
    pub fn with_content_negotiation(self) -> Self {
        Self {
            engine: self.engine.with_content_negotiation(),
            connection: self.connection,
            delivery_tag: self.delivery_tag,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ExecutionEngine<C> {
        &mut self.engine
    }

    pub fn consumer(&self) -> &C {
        self.engine.consumer()
    }

    pub fn connection(&self) -> &Arc<MockConnection> {
        &self.connection
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.connection.published()
    }

    /// Build an inbound message on the mock connection. `message_id` and
    /// `timestamp` are filled in when unset.
    pub fn create_message(&self, body: impl Into<Vec<u8>>, properties: Properties) -> Message {
        self.create_message_on(TEST_EXCHANGE, TEST_ROUTING_KEY, body, properties)
    }

    pub fn create_message_on(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Vec<u8>>,
        mut properties: Properties,
    ) -> Message {
        if properties.message_id.is_none() {
            properties.message_id = Some(Uuid::new_v4().to_string());
        }
        if properties.timestamp.is_none() {
            properties.timestamp = Some(Utc::now());
        }
        let tag = self.delivery_tag.fetch_add(1, Ordering::SeqCst) + 1;
        Message::new(MOCK_CONNECTION, tag, exchange, routing_key, body).with_properties(properties)
    }

    pub async fn execute(&self, message: Message) -> ExecutionResult {
        self.engine.execute(message, Measurement::new()).await
    }

    /// Execute a message and turn any outcome other than `ACK` into an
    /// error of the matching kind
    pub async fn process_message(
        &self,
        body: impl Into<Vec<u8>>,
        properties: Properties,
    ) -> ConsumerResult<Measurement> {
        let message = self.create_message(body, properties);
        let result = self.execute(message).await;
        match result.outcome {
            Outcome::Ack => Ok(result.measurement),
            Outcome::Drop => Err(ConsumerError::message("message dropped")),
            Outcome::MessageException => Err(ConsumerError::message("MESSAGE_EXCEPTION")),
            Outcome::ConsumerException => Err(ConsumerError::consumer("CONSUMER_EXCEPTION")),
            Outcome::ConfigurationException => {
                Err(ConsumerError::configuration("CONFIGURATION_EXCEPTION"))
            }
            Outcome::ProcessingException => Err(ConsumerError::processing("PROCESSING_EXCEPTION")),
            Outcome::BrokerException => {
                Err(ConsumerError::broker(MOCK_CONNECTION, 999, "test-exception"))
            }
            Outcome::UnhandledException => Err(ConsumerError::Unhandled(anyhow::anyhow!(
                "UNHANDLED_EXCEPTION"
            ))),
        }
    }
}
