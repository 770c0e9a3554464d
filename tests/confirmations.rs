//! Publisher confirmations observed from inside `process`

mod common;

use std::sync::Arc;
use std::time::Duration;

use amqp_harness::prelude::*;
use amqp_harness::testing::{MockConnection, PublishSideEffect, TestHarness};
use amqp_harness::Measurement;
use common::PublishingConsumer;

const PRIMARY: &str = "primary";

fn engine(consumer: PublishingConsumer) -> (ExecutionEngine<PublishingConsumer>, Arc<MockConnection>) {
    let engine = ExecutionEngine::new(consumer, ConsumerConfig::new("publisher"));
    // No tracker attached: confirmations are fed through the engine by hand
    let connection = Arc::new(MockConnection::new(PRIMARY).with_publisher_confirmations(true));
    engine.set_connection(connection.clone());
    (engine, connection)
}

fn message() -> Message {
    Message::new(PRIMARY, 1, "commands", "create", b"{}".to_vec())
}

async fn wait_for_pending(engine: &ExecutionEngine<PublishingConsumer>, count: usize) {
    while engine.confirmation_tracker().pending_count(PRIMARY) < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_multiple_ack_resolves_in_order() {
    let (engine, connection) = engine(PublishingConsumer::new(3, 2));

    let (result, resolved) = tokio::join!(engine.execute(message(), Measurement::new()), async {
        wait_for_pending(&engine, 3).await;
        engine.on_confirmation(PRIMARY, 2, true, true)
    });

    assert_eq!(resolved, 2);
    assert_eq!(result.outcome, Outcome::Ack);
    assert_eq!(
        *engine.consumer().results.lock(),
        vec![Some(Confirmation::Ack), Some(Confirmation::Ack), None]
    );
    // Confirmations still pending after an ACK are abandoned
    assert_eq!(engine.confirmation_tracker().pending_count(PRIMARY), 0);

    let published = connection.published();
    assert_eq!(published.len(), 3);
    assert!(published.iter().all(|p| p.mandatory));
    assert_eq!(
        published.iter().map(|p| p.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_nack_and_return_frames() {
    let (engine, _) = engine(PublishingConsumer::new(2, 2));

    let (result, _) = tokio::join!(engine.execute(message(), Measurement::new()), async {
        wait_for_pending(&engine, 2).await;
        assert!(engine.on_return(PRIMARY, 2));
        engine.on_confirmation(PRIMARY, 1, false, false);
        engine.on_confirmation(PRIMARY, 2, true, false);
    });

    assert_eq!(result.outcome, Outcome::Ack);
    assert_eq!(
        *engine.consumer().results.lock(),
        vec![Some(Confirmation::Nack), Some(Confirmation::Returned)]
    );
}

#[tokio::test]
async fn test_connection_lost_abandons_pending() {
    let (engine, _) = engine(PublishingConsumer::new(2, 2));

    let (result, abandoned) = tokio::join!(engine.execute(message(), Measurement::new()), async {
        wait_for_pending(&engine, 2).await;
        engine.on_connection_lost(PRIMARY)
    });

    assert_eq!(abandoned, 2);
    assert_eq!(result.outcome, Outcome::Ack);
    assert_eq!(
        *engine.consumer().results.lock(),
        vec![Some(Confirmation::Abandoned), Some(Confirmation::Abandoned)]
    );
}

#[tokio::test]
async fn test_mock_confirms_automatically() {
    let connection = MockConnection::new("mock").with_publisher_confirmations(true);
    let harness = TestHarness::with_connection(
        PublishingConsumer::new(2, 2),
        ConsumerConfig::new("publisher"),
        connection,
    );

    harness.process_message("{}", Properties::new()).await.unwrap();
    assert_eq!(
        *harness.consumer().results.lock(),
        vec![Some(Confirmation::Ack), Some(Confirmation::Ack)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirmations_racing_registration_are_not_lost() {
    for _ in 0..200 {
        let connection = MockConnection::new("mock").with_publisher_confirmations(true);
        let harness = TestHarness::with_connection(
            PublishingConsumer::new(1, 1),
            ConsumerConfig::new("publisher"),
            connection,
        );
        let message = harness.create_message("{}", Properties::new());

        let result = tokio::time::timeout(Duration::from_secs(5), harness.execute(message))
            .await
            .expect("execution waited forever on a confirmation");
        assert_eq!(result.outcome, Outcome::Ack);
        assert_eq!(
            *harness.consumer().results.lock(),
            vec![Some(Confirmation::Ack)]
        );
    }
}

#[tokio::test]
async fn test_side_effects_shape_confirmations() {
    let connection = MockConnection::new("mock").with_publisher_confirmations(true);
    let harness = TestHarness::with_connection(
        PublishingConsumer::new(3, 3),
        ConsumerConfig::new("publisher"),
        connection,
    );
    harness.connection().set_side_effect(|request| {
        match std::str::from_utf8(&request.body) {
            Ok("message 1") => PublishSideEffect::Undelivered,
            Ok("message 2") => PublishSideEffect::Unroutable,
            _ => PublishSideEffect::Delivered,
        }
    });

    harness.process_message("{}", Properties::new()).await.unwrap();
    assert_eq!(
        *harness.consumer().results.lock(),
        vec![
            Some(Confirmation::Ack),
            Some(Confirmation::Nack),
            Some(Confirmation::Returned)
        ]
    );
    let effects: Vec<_> = harness
        .published_messages()
        .iter()
        .map(|p| p.side_effect)
        .collect();
    assert_eq!(
        effects,
        vec![
            PublishSideEffect::Delivered,
            PublishSideEffect::Undelivered,
            PublishSideEffect::Unroutable
        ]
    );
}

#[tokio::test]
async fn test_no_handles_without_confirmations() {
    let harness = TestHarness::new(PublishingConsumer::new(3, 3), ConsumerConfig::new("publisher"));

    harness.process_message("{}", Properties::new()).await.unwrap();
    assert!(harness.consumer().results.lock().is_empty());
    let published = harness.published_messages();
    assert_eq!(published.len(), 3);
    assert!(published.iter().all(|p| !p.mandatory));
}

#[tokio::test]
async fn test_publish_on_closed_connection_is_a_broker_error() {
    let harness = TestHarness::new(PublishingConsumer::new(1, 1), ConsumerConfig::new("publisher"));
    harness.connection().set_channel_open(false);

    let message = harness.create_message("{}", Properties::new());
    let result = harness.execute(message).await;
    assert_eq!(result.outcome, Outcome::BrokerException);
    assert!(harness.published_messages().is_empty());
}
