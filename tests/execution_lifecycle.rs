//! End-to-end execution lifecycle through the test harness

mod common;

use amqp_harness::constants::headers::{
    DROPPED_BY, DROPPED_REASON, DROPPED_TIMESTAMP, ORIGINAL_EXCHANGE, PROCESSING_EXCEPTION,
    PROCESSING_EXCEPTIONS,
};
use amqp_harness::constants::measurements::{ERROR_TAG, EXCEPTION_TAG};
use amqp_harness::messaging::HeaderValue;
use amqp_harness::prelude::*;
use amqp_harness::retry;
use amqp_harness::testing::{TestHarness, TEST_EXCHANGE, TEST_ROUTING_KEY};
use amqp_harness::ErrorKind;
use common::{retry_counter, ReplyingConsumer, Script, ScriptedConsumer};
use proptest::prelude::*;

fn harness(script: Script, config: ConsumerConfig) -> TestHarness<ScriptedConsumer> {
    TestHarness::new(ScriptedConsumer::new(script), config)
}

fn retried(count: i64) -> Properties {
    Properties::new().with_header(PROCESSING_EXCEPTIONS, count)
}

#[tokio::test]
async fn test_every_path_finishes_exactly_once() {
    let scripts = [
        (Script::Succeed, Outcome::Ack),
        (Script::FinishInPrepare, Outcome::Ack),
        (
            Script::FailInPrepare(|| ConsumerError::message("bad")),
            Outcome::MessageException,
        ),
        (
            Script::FailInProcess(|| ConsumerError::consumer("unhealthy")),
            Outcome::ConsumerException,
        ),
        (
            Script::FailInProcess(|| ConsumerError::configuration("missing")),
            Outcome::ConfigurationException,
        ),
        (
            Script::FailInProcess(|| ConsumerError::broker("mock", 320, "CONNECTION_FORCED")),
            Outcome::BrokerException,
        ),
        (
            Script::FinishTwiceThenFail(|| anyhow::anyhow!("boom").into()),
            Outcome::UnhandledException,
        ),
    ];

    for (script, expected) in scripts {
        let harness = harness(script, ConsumerConfig::new("lifecycle"));
        let message = harness.create_message("{}", Properties::new());
        let result = harness.execute(message).await;

        assert_eq!(result.outcome, expected, "script {script:?}");
        let (prepared, _, finished) = harness.consumer().counts();
        assert_eq!(prepared, 1);
        assert_eq!(finished, 1, "script {script:?}");
    }
}

#[tokio::test]
async fn test_finish_in_prepare_skips_process() {
    let harness = harness(Script::FinishInPrepare, ConsumerConfig::new("lifecycle"));
    let measurement = harness
        .process_message("{}", Properties::new())
        .await
        .unwrap();

    assert_eq!(harness.consumer().counts(), (1, 0, 1));
    assert!(measurement.tag(EXCEPTION_TAG).is_none());
}

#[tokio::test]
async fn test_process_message_maps_outcomes_to_errors() {
    let harness = harness(
        Script::FailInProcess(|| ConsumerError::message("bad payload")),
        ConsumerConfig::new("lifecycle"),
    );
    let err = harness
        .process_message("{}", Properties::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Message);
}

#[tokio::test]
async fn test_poison_message_at_maximum_is_dropped() {
    let config = ConsumerConfig::new("lifecycle")
        .with_error_max_retries(5)
        .with_drop_exchange("dead-letters");
    let harness = harness(Script::Succeed, config);

    let message = harness.create_message("payload", retried(5));
    let result = harness.execute(message).await;

    assert_eq!(result.outcome, Outcome::Drop);
    assert_eq!(harness.consumer().counts(), (0, 0, 0));

    let published = harness.published_messages();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "dead-letters");
    assert_eq!(published[0].routing_key, TEST_ROUTING_KEY);
    assert_eq!(published[0].body_str(), Some("payload"));
    assert_eq!(
        published[0].header(DROPPED_REASON).and_then(HeaderValue::as_str),
        Some("max retries (5)")
    );
}

#[tokio::test]
async fn test_message_below_maximum_is_processed() {
    let config = ConsumerConfig::new("lifecycle")
        .with_error_max_retries(5)
        .with_drop_exchange("dead-letters");
    let harness = harness(Script::Succeed, config);

    let message = harness.create_message("payload", retried(4));
    let result = harness.execute(message).await;

    assert_eq!(result.outcome, Outcome::Ack);
    assert_eq!(harness.consumer().counts(), (1, 1, 1));
    assert!(harness.published_messages().is_empty());
}

#[tokio::test]
async fn test_dropped_message_carries_all_drop_headers() {
    let config = ConsumerConfig::new("auditor")
        .with_message_type("user.created")
        .with_drop_invalid_messages(true)
        .with_drop_exchange("dropped");
    let harness = harness(Script::Succeed, config);

    let properties = Properties::new()
        .with_message_type("user.deleted")
        .with_header("Trace", "abc");
    let message = harness.create_message(b"\x01\x02body".to_vec(), properties);
    let result = harness.execute(message).await;

    assert_eq!(result.outcome, Outcome::Drop);
    let published = harness.published_messages();
    assert_eq!(published.len(), 1);
    let dropped = &published[0];
    assert_eq!(dropped.exchange, "dropped");
    assert_eq!(dropped.body, b"\x01\x02body");
    assert!(!dropped.mandatory);
    assert_eq!(
        dropped.header(DROPPED_BY).and_then(HeaderValue::as_str),
        Some("auditor")
    );
    assert_eq!(
        dropped.header(DROPPED_REASON).and_then(HeaderValue::as_str),
        Some("invalid type")
    );
    assert_eq!(
        dropped.header(ORIGINAL_EXCHANGE).and_then(HeaderValue::as_str),
        Some(TEST_EXCHANGE)
    );
    let timestamp = dropped
        .header(DROPPED_TIMESTAMP)
        .and_then(HeaderValue::as_str)
        .unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert_eq!(
        dropped.header("Trace").and_then(HeaderValue::as_str),
        Some("abc")
    );
    assert_eq!(
        dropped.properties.message_type.as_deref(),
        Some("user.deleted")
    );
}

#[tokio::test]
async fn test_processing_error_increments_counter() {
    let harness = harness(
        Script::FailInProcess(|| ConsumerError::processing("upstream timeout")),
        ConsumerConfig::new("lifecycle"),
    );

    let message = harness.create_message("payload", retried(3));
    let result = harness.execute(message).await;
    assert_eq!(result.outcome, Outcome::ProcessingException);
    assert_eq!(
        result.measurement.tag(EXCEPTION_TAG),
        Some("ProcessingException")
    );

    let published = harness.published_messages();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "errors");
    assert_eq!(published[0].body_str(), Some("payload"));
    assert_eq!(
        published[0].header(PROCESSING_EXCEPTIONS),
        Some(&HeaderValue::Int(4))
    );
    assert_eq!(
        published[0]
            .header(PROCESSING_EXCEPTION)
            .and_then(HeaderValue::as_str),
        Some("ProcessingException")
    );
}

#[tokio::test]
async fn test_processing_error_starts_counter_at_one() {
    let harness = harness(
        Script::FailInProcess(|| ConsumerError::processing("nope").with_metric("db-timeout")),
        ConsumerConfig::new("lifecycle").with_error_exchange("retries"),
    );

    let message = harness.create_message("payload", Properties::new());
    let result = harness.execute(message).await;

    assert_eq!(result.measurement.tag(ERROR_TAG), Some("db-timeout"));
    let published = harness.published_messages();
    assert_eq!(published[0].exchange, "retries");
    assert_eq!(
        published[0].header(PROCESSING_EXCEPTIONS),
        Some(&HeaderValue::Int(1))
    );
    assert_eq!(
        published[0]
            .header(PROCESSING_EXCEPTION)
            .and_then(HeaderValue::as_str),
        Some("db-timeout")
    );
}

#[tokio::test]
async fn test_republish_failure_keeps_outcome() {
    let harness = harness(
        Script::FailInProcess(|| ConsumerError::processing("nope")),
        ConsumerConfig::new("lifecycle"),
    );
    let message = harness.create_message("payload", Properties::new());
    harness.connection().set_connected(false);

    let result = harness.execute(message).await;
    assert_eq!(result.outcome, Outcome::ProcessingException);
    assert!(harness.published_messages().is_empty());
}

#[tokio::test]
async fn test_reply_without_reply_to_fails_before_publishing() {
    let harness = TestHarness::new(ReplyingConsumer::default(), ConsumerConfig::new("rpc"));
    let message = harness.create_message("ping", Properties::new());
    let result = harness.execute(message).await;

    assert_eq!(result.outcome, Outcome::UnhandledException);
    assert_eq!(result.measurement.tag(EXCEPTION_TAG), Some("InvalidInput"));
    assert!(harness.published_messages().is_empty());
}

#[tokio::test]
async fn test_reply_routes_to_inbound_reply_to() {
    let harness = TestHarness::new(ReplyingConsumer::default(), ConsumerConfig::new("rpc"));
    let properties = Properties::new()
        .with_reply_to("rpc.responses")
        .with_message_id("req-7");
    let message = harness.create_message("ping", properties);
    let result = harness.execute(message).await;

    assert_eq!(result.outcome, Outcome::Ack);
    let published = harness.published_messages();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, TEST_EXCHANGE);
    assert_eq!(published[0].routing_key, "rpc.responses");
    assert_eq!(published[0].body_str(), Some("pong"));
    assert_eq!(published[0].properties.app_id.as_deref(), Some("rpc"));
    assert_eq!(
        published[0].properties.correlation_id.as_deref(),
        Some("req-7")
    );
}

#[tokio::test]
async fn test_correlation_id_reaches_connection() {
    let harness = harness(Script::Succeed, ConsumerConfig::new("lifecycle"));
    let message = harness.create_message("{}", Properties::new().with_correlation_id("corr-1"));
    harness.execute(message).await;

    assert_eq!(harness.connection().correlation_id().as_deref(), Some("corr-1"));
}

proptest! {
    #[test]
    fn prop_counter_only_grows(count in retry_counter()) {
        let message = Message::new("mock", 1, "events", "rk", b"x".to_vec())
            .with_properties(retried(count));
        let properties = retry::processing_error_properties(&message, None);
        prop_assert_eq!(retry::retry_count(&properties), Some(count + 1));
    }

    #[test]
    fn prop_drop_boundary_matches_maximum(count in retry_counter(), max in 1u32..500) {
        let dropped = retry::exceeds_max_retries(&retried(count), max);
        prop_assert_eq!(dropped, count >= i64::from(max));
    }
}
