//! # Publisher Confirmation Tracker
//!
//! Correlates broker publisher confirmations with the publishes that
//! produced them. Each connection has an ordered map from delivery
//! sequence number to a pending handle; the map is emptied when the
//! connection is cleared so handles never outlive the connection.
//!
//! Broker clients deliver confirmations from their own I/O task, so a
//! confirmation can arrive before the publisher registers the sequence
//! number it got back. While a publish is in flight
//! ([`ConfirmationTracker::begin_publish`]) unmatched confirmations and
//! returns are buffered and applied on registration.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connection::BrokerConnection;
use crate::messaging::Properties;

/// Final state of a tracked publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Accepted by the broker
    Ack,
    /// Rejected by the broker
    Nack,
    /// Confirmed, but returned as unroutable first
    Returned,
    /// Tracking was cleared before the broker answered
    Abandoned,
}

impl Confirmation {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Confirmation::Ack)
    }
}

/// Metadata of a publish awaiting confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub connection: String,
    pub exchange: String,
    pub routing_key: String,
    pub properties: Properties,
}

#[derive(Debug)]
struct PendingEntry {
    info: PendingConfirmation,
    returned: bool,
    sender: oneshot::Sender<Confirmation>,
}

impl PendingEntry {
    fn resolve(self, sequence: u64, ack: bool) {
        let result = match (ack, self.returned) {
            (true, false) => Confirmation::Ack,
            (true, true) => Confirmation::Returned,
            (false, _) => Confirmation::Nack,
        };
        debug!(
            connection = %self.info.connection,
            sequence = sequence,
            exchange = %self.info.exchange,
            routing_key = %self.info.routing_key,
            result = ?result,
            "publisher confirmation resolved"
        );
        // The receiver may have been dropped by user code
        let _ = self.sender.send(result);
    }

    fn abandon(self) {
        let _ = self.sender.send(Confirmation::Abandoned);
    }
}

/// Awaitable result of a publish on a connection with confirmations enabled
#[derive(Debug)]
pub struct ConfirmationHandle {
    connection: String,
    sequence: u64,
    receiver: oneshot::Receiver<Confirmation>,
}

impl ConfirmationHandle {
    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The result if it is already known
    pub fn try_result(&mut self) -> Option<Confirmation> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Confirmation::Abandoned),
        }
    }
}

impl Future for ConfirmationHandle {
    type Output = Confirmation;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|result| result.unwrap_or(Confirmation::Abandoned))
    }
}

/// Confirmations that arrived for sequences not registered yet.
///
/// Only kept while a publish is in flight on the connection: the broker
/// may confirm a publish before the publisher has seen its sequence
/// number.
#[derive(Debug, Default)]
struct EarlyConfirmations {
    single: BTreeMap<u64, bool>,
    /// `multiple` confirmations keyed by the sequence they cover up to
    multiple: BTreeMap<u64, bool>,
    returned: BTreeSet<u64>,
}

impl EarlyConfirmations {
    fn take(&mut self, sequence: u64) -> Option<bool> {
        self.single.remove(&sequence).or_else(|| {
            self.multiple
                .range(sequence..)
                .next()
                .map(|(_, ack)| *ack)
        })
    }

    fn is_empty(&self) -> bool {
        self.single.is_empty() && self.multiple.is_empty() && self.returned.is_empty()
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    pending: BTreeMap<u64, PendingEntry>,
    in_flight: usize,
    early: EarlyConfirmations,
}

impl ConnectionState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0
    }
}

/// Marks a publish as in flight on a connection until dropped. Created
/// before the publish is sent so a confirmation that beats
/// [`ConfirmationTracker::register`] is kept rather than discarded.
#[must_use = "confirmations are only buffered while the guard is alive"]
#[derive(Debug)]
pub struct InFlightPublish<'a> {
    tracker: &'a ConfirmationTracker,
    connection: String,
}

impl Drop for InFlightPublish<'_> {
    fn drop(&mut self) {
        let mut connections = self.tracker.connections.lock();
        let Some(state) = connections.get_mut(&self.connection) else {
            return;
        };
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            if !state.early.is_empty() {
                debug!(connection = %self.connection, "discarding unmatched early confirmations");
            }
            state.early = EarlyConfirmations::default();
        }
        if state.is_idle() {
            connections.remove(&self.connection);
        }
    }
}

/// Per-connection ordered maps of pending confirmations
#[derive(Debug, Default)]
pub struct ConfirmationTracker {
    connections: Mutex<HashMap<String, ConnectionState>>,
}

impl ConfirmationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce a publish on `connection`; hold the guard until the
    /// publish has been passed to [`register`](Self::register)
    pub fn begin_publish(&self, connection: &str) -> InFlightPublish<'_> {
        self.connections
            .lock()
            .entry(connection.to_string())
            .or_default()
            .in_flight += 1;
        InFlightPublish {
            tracker: self,
            connection: connection.to_string(),
        }
    }

    /// Track a publish; returns a handle only when the connection has
    /// publisher confirmations enabled.
    ///
    /// A confirmation already received for `sequence` resolves the handle
    /// immediately.
    pub fn register(
        &self,
        connection: &dyn BrokerConnection,
        sequence: u64,
        exchange: &str,
        routing_key: &str,
        properties: &Properties,
    ) -> Option<ConfirmationHandle> {
        if !connection.publisher_confirmations() {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        let mut entry = PendingEntry {
            info: PendingConfirmation {
                connection: connection.name().to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                properties: properties.clone(),
            },
            returned: false,
            sender,
        };
        let handle = ConfirmationHandle {
            connection: connection.name().to_string(),
            sequence,
            receiver,
        };

        let mut connections = self.connections.lock();
        let state = connections.entry(connection.name().to_string()).or_default();
        entry.returned = state.early.returned.remove(&sequence);
        if let Some(ack) = state.early.take(sequence) {
            drop(connections);
            debug!(
                connection = connection.name(),
                sequence, "confirmation arrived before registration"
            );
            entry.resolve(sequence, ack);
            return Some(handle);
        }

        if let Some(previous) = state.pending.insert(sequence, entry) {
            warn!(
                connection = connection.name(),
                sequence = sequence,
                "sequence number reused, abandoning earlier publish"
            );
            previous.abandon();
        }
        Some(handle)
    }

    /// Resolve the handle for `sequence`, or every handle up to and
    /// including it when `multiple` is set. Returns the number resolved.
    pub fn resolve(&self, connection: &str, sequence: u64, ack: bool, multiple: bool) -> usize {
        let resolved: Vec<(u64, PendingEntry)> = {
            let mut connections = self.connections.lock();
            let Some(state) = connections.get_mut(connection) else {
                warn!(connection, sequence, "confirmation for connection with nothing pending");
                return 0;
            };
            let resolved: Vec<(u64, PendingEntry)> = if multiple {
                let newer = match sequence.checked_add(1) {
                    Some(next) => state.pending.split_off(&next),
                    None => BTreeMap::new(),
                };
                std::mem::replace(&mut state.pending, newer).into_iter().collect()
            } else {
                state
                    .pending
                    .remove(&sequence)
                    .map(|entry| vec![(sequence, entry)])
                    .unwrap_or_default()
            };

            if state.in_flight > 0 {
                if multiple {
                    state.early.multiple.insert(sequence, ack);
                } else if resolved.is_empty() {
                    state.early.single.insert(sequence, ack);
                }
            } else if resolved.is_empty() {
                warn!(connection, sequence, multiple, "confirmation for unknown sequence");
            }
            if state.is_idle() {
                connections.remove(connection);
            }
            resolved
        };

        let count = resolved.len();
        for (sequence, entry) in resolved {
            entry.resolve(sequence, ack);
        }
        count
    }

    /// Record a basic.return for `sequence`; its later ack resolves as
    /// [`Confirmation::Returned`]
    pub fn mark_returned(&self, connection: &str, sequence: u64) -> bool {
        let mut connections = self.connections.lock();
        let Some(state) = connections.get_mut(connection) else {
            return false;
        };
        match state.pending.get_mut(&sequence) {
            Some(entry) => {
                entry.returned = true;
                true
            }
            None if state.in_flight > 0 => {
                state.early.returned.insert(sequence);
                true
            }
            None => false,
        }
    }

    /// Abandon every pending handle of `connection`
    pub fn clear(&self, connection: &str) -> usize {
        let entries = {
            let mut connections = self.connections.lock();
            let Some(state) = connections.get_mut(connection) else {
                return 0;
            };
            let entries = std::mem::take(&mut state.pending);
            state.early = EarlyConfirmations::default();
            if state.is_idle() {
                connections.remove(connection);
            }
            entries
        };
        let count = entries.len();
        if count > 0 {
            debug!(connection, count, "clearing pending confirmations");
        }
        entries.into_values().for_each(PendingEntry::abandon);
        count
    }

    pub fn pending_count(&self, connection: &str) -> usize {
        self.connections
            .lock()
            .get(connection)
            .map(|state| state.pending.len())
            .unwrap_or(0)
    }

    /// Metadata of the pending publishes on `connection`, in sequence order
    pub fn pending(&self, connection: &str) -> Vec<(u64, PendingConfirmation)> {
        self.connections
            .lock()
            .get(connection)
            .map(|state| {
                state
                    .pending
                    .iter()
                    .map(|(seq, entry)| (*seq, entry.info.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
