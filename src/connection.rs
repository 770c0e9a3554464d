//! # Broker Connections
//!
//! The narrow interface the execution engine uses to talk to the broker
//! client layer, and the named registry of connections a consumer may
//! publish on.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::constants::{NOT_CONNECTED_CODE, NOT_CONNECTED_TEXT};
use crate::error::{ConsumerError, ConsumerResult};
use crate::messaging::Properties;

/// A fully encoded publish handed to the connection
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub exchange: String,
    pub routing_key: String,
    pub properties: Properties,
    pub body: Vec<u8>,
    /// Ask the broker to return the message when it can not be routed
    pub mandatory: bool,
}

/// Named handle onto a broker connection and its channel.
///
/// Confirmation frames are not delivered through this trait; the broker
/// client feeds them to
/// [`ExecutionEngine::on_confirmation`](crate::engine::ExecutionEngine::on_confirmation).
#[async_trait]
pub trait BrokerConnection: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn channel_is_open(&self) -> bool;

    /// Whether publisher confirmations are enabled on the channel
    fn publisher_confirmations(&self) -> bool;

    /// Publish a message, returning the delivery sequence number the
    /// channel assigned to it. Sequence numbers strictly increase per
    /// connection.
    async fn publish(&self, request: PublishRequest) -> ConsumerResult<u64>;

    /// Attach the correlation id of the message being processed to the
    /// connection's log context
    fn set_correlation_id(&self, correlation_id: &str) {
        let _ = correlation_id;
    }
}

/// Connections available to a consumer, keyed by name
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<dyn BrokerConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Arc<dyn BrokerConnection>) {
        self.connections
            .insert(connection.name().to_string(), connection);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn BrokerConnection>> {
        self.connections.remove(name).map(|(_, connection)| connection)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BrokerConnection>> {
        self.connections.get(name).map(|entry| entry.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connection to publish on; fails when it is unknown or not usable
    pub fn publish_connection(&self, name: &str) -> ConsumerResult<Arc<dyn BrokerConnection>> {
        let connection = self
            .get(name)
            .ok_or_else(|| ConsumerError::invalid_input(format!("Connection {name} not found")))?;
        if !connection.is_connected() || !connection.channel_is_open() {
            return Err(ConsumerError::broker(
                connection.name(),
                NOT_CONNECTED_CODE,
                NOT_CONNECTED_TEXT,
            ));
        }
        Ok(connection)
    }
}
