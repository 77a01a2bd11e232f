//! End-to-end tests for the bus handler lifecycle over mock collaborators
//!
//! Covers connection retry, subscription, handler fan-out, replies, audit
//! events, outbound sends, the pre-connect neighbor-cache hook, and
//! shutdown behavior.

use agentbus::bus::{BusHandler, CONNECT_MAX_ATTEMPTS};
use agentbus::config::{AgentSection, MbusSection, Settings, StaticSettings};
use agentbus::error::{BusError, HandlerError};
use agentbus::testing::mocks::{MockBusClient, MockPlatform};
use agentbus::transport::InboundMessage;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn test_settings(url: &str) -> Arc<StaticSettings> {
    Arc::new(StaticSettings(Settings {
        agent: AgentSection {
            id: "abc123".to_string(),
        },
        mbus: MbusSection {
            url: url.to_string(),
            mutual_tls: None,
        },
    }))
}

fn fixture() -> (Arc<MockBusClient>, Arc<MockPlatform>, BusHandler) {
    let client = MockBusClient::new();
    let platform = MockPlatform::new();
    let handler = BusHandler::new(
        test_settings("nats://10.0.0.5:4222"),
        client.clone(),
        platform.clone(),
    );
    (client, platform, handler)
}

fn ping(reply_to: &str) -> InboundMessage {
    InboundMessage {
        subject: "agent.abc123".to_string(),
        payload: format!(r#"{{"method":"ping","reply_to":"{reply_to}"}}"#).into_bytes(),
        reply_to: reply_to.to_string(),
    }
}

/// Poll until `cond` holds or a deadline passes; dispatch runs on a
/// background task, so assertions on its effects need to wait for it.
async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_start_subscribes_to_private_agent_subject() {
    let (client, _platform, handler) = fixture();

    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    assert_eq!(client.subscriptions().await, vec!["agent.abc123".to_string()]);
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_successful_handler_replies_exactly_once_to_reply_subject() {
    let (client, _platform, handler) = fixture();
    handler
        .start(Arc::new(|_req| Ok(Some(json!({"value": "pong"})))))
        .await
        .unwrap();

    client.deliver(ping("director.reply.42")).await;

    wait_until(|| async { !client.published().await.is_empty() }).await;
    let published = client.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "director.reply.42");
    assert_eq!(published[0].1, br#"{"value":"pong"}"#.to_vec());
}

#[tokio::test]
async fn test_failing_handlers_publish_nothing_and_audit_one_failure() {
    let (client, platform, handler) = fixture();
    handler
        .start(Arc::new(|_req| Err(HandlerError::failed("exploded"))))
        .await
        .unwrap();

    client.deliver(ping("director.reply.42")).await;

    wait_until(|| async { !platform.sink.err_lines().is_empty() }).await;
    assert!(client.published().await.is_empty());
    assert_eq!(platform.sink.err_lines().len(), 1);
    assert!(platform.sink.debug_lines().is_empty());
}

#[tokio::test]
async fn test_all_handlers_invoked_once_each_in_registration_order() {
    let (client, _platform, handler) = fixture();
    let order = Arc::new(Mutex::new(Vec::new()));

    // One handler before start (via start itself), two after.
    let o = order.clone();
    handler
        .start(Arc::new(move |_req| {
            o.lock().unwrap().push(0);
            Ok(None)
        }))
        .await
        .unwrap();
    for i in 1..3 {
        let o = order.clone();
        handler.register_additional_func(Arc::new(move |_req| {
            o.lock().unwrap().push(i);
            Ok(None)
        }));
    }

    client.deliver(ping("")).await;

    wait_until(|| async { order.lock().unwrap().len() == 3 }).await;
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_send_builds_exact_subject_and_payload() {
    let (client, _platform, handler) = fixture();
    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    handler
        .send("director", "heartbeat", &json!({"x": 1}))
        .await
        .unwrap();

    let published = client.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "director.agent.heartbeat.abc123");
    assert_eq!(published[0].1, br#"{"x":1}"#.to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_connect_retry_exhaustion_surfaces_connection_error() {
    let (client, _platform, handler) = fixture();
    client.fail_connects(CONNECT_MAX_ATTEMPTS).await;

    let err = handler.start(Arc::new(|_req| Ok(None))).await.unwrap_err();

    assert!(matches!(err, BusError::Connection(_)));
    assert_eq!(client.connect_attempts().await, CONNECT_MAX_ATTEMPTS);
    assert!(client.subscriptions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_after_transient_failures() {
    let (client, _platform, handler) = fixture();
    client.fail_connects(2).await;

    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    assert_eq!(client.connect_attempts().await, 3);
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_subscribe_failure_leaves_connection_open() {
    let (client, _platform, handler) = fixture();
    client.fail_subscribe().await;

    let err = handler.start(Arc::new(|_req| Ok(None))).await.unwrap_err();

    assert!(matches!(err, BusError::Subscription { .. }));
    // The caller must stop; the layer does not tear the connection down.
    assert!(client.is_connected().await);
    assert_eq!(client.disconnect_calls().await, 0);
}

#[tokio::test]
async fn test_stop_twice_is_idempotent() {
    let (client, _platform, handler) = fixture();
    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    handler.stop().await;
    handler.stop().await;

    assert_eq!(client.disconnect_calls().await, 2);
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_literal_ip_address_triggers_neighbor_cache_eviction() {
    let (_client, platform, handler) = fixture();

    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    assert_eq!(
        platform.evicted_ips(),
        vec!["10.0.0.5".parse::<std::net::IpAddr>().unwrap()]
    );
}

#[tokio::test]
async fn test_hostname_address_skips_neighbor_cache_eviction() {
    let client = MockBusClient::new();
    let platform = MockPlatform::new();
    let handler = BusHandler::new(
        test_settings("nats://bus.internal:4222"),
        client.clone(),
        platform.clone(),
    );

    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    assert!(platform.evicted_ips().is_empty());
}

#[tokio::test]
async fn test_failed_neighbor_cache_eviction_is_not_fatal() {
    let client = MockBusClient::new();
    let platform = MockPlatform::with_failing_evictions();
    let handler = BusHandler::new(
        test_settings("nats://10.0.0.5:4222"),
        client.clone(),
        platform,
    );

    assert!(handler.start(Arc::new(|_req| Ok(None))).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_send_retries_transient_publish_failures() {
    let (client, _platform, handler) = fixture();
    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();
    client.fail_publishes(2).await;

    handler
        .send("director", "heartbeat", &json!({"x": 1}))
        .await
        .unwrap();

    assert_eq!(client.published().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_surfaces_transport_error_after_retry_exhaustion() {
    let (client, _platform, handler) = fixture();
    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();
    client.fail_publishes(10).await;

    let err = handler
        .send("director", "heartbeat", &json!({"x": 1}))
        .await
        .unwrap_err();

    assert!(matches!(err, BusError::Transport(_)));
    assert!(client.published().await.is_empty());
}

#[tokio::test]
async fn test_unserializable_message_is_an_encoding_error_without_publishing() {
    let (client, _platform, handler) = fixture();
    handler.start(Arc::new(|_req| Ok(None))).await.unwrap();

    // serde_json rejects maps with non-string keys
    let mut bad = std::collections::HashMap::new();
    bad.insert(vec![1u8], "value");

    let err = handler.send("director", "heartbeat", &bad).await.unwrap_err();

    assert!(matches!(err, BusError::Encoding(_)));
    assert!(client.published().await.is_empty());
}

#[tokio::test]
async fn test_missing_credentials_fail_start_closed() {
    let client = MockBusClient::new();
    let handler = BusHandler::new(
        test_settings("nats://agent@10.0.0.5:4222"),
        client.clone(),
        MockPlatform::new(),
    );

    let err = handler.start(Arc::new(|_req| Ok(None))).await.unwrap_err();

    assert!(matches!(err, BusError::Credential(_)));
    assert_eq!(client.connect_attempts().await, 0);
}

#[tokio::test]
async fn test_concurrent_registration_during_deliveries_loses_no_handlers() {
    let (client, _platform, handler) = fixture();
    let handler = Arc::new(handler);
    let invocations = Arc::new(AtomicU32::new(0));

    let count = invocations.clone();
    handler
        .start(Arc::new(move |_req| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }))
        .await
        .unwrap();

    // Register 10 more handlers from concurrent tasks while deliveries
    // stream in.
    let mut registrations = Vec::new();
    for _ in 0..10 {
        let handler = handler.clone();
        let count = invocations.clone();
        registrations.push(tokio::spawn(async move {
            handler.register_additional_func(Arc::new(move |_req| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }));
        }));
    }
    let deliveries = {
        let client = client.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                client.deliver(ping("")).await;
            }
        })
    };
    futures::future::join_all(registrations).await;
    deliveries.await.unwrap();

    // Let the in-flight deliveries drain, then a fresh delivery must see
    // every registered handler.
    tokio::time::sleep(Duration::from_millis(100)).await;
    invocations.store(0, Ordering::SeqCst);
    client.deliver(ping("")).await;
    wait_until(|| async { invocations.load(Ordering::SeqCst) == 11 }).await;
}

#[tokio::test]
async fn test_run_returns_after_shutdown_handle_fires_and_disconnects() {
    let (client, _platform, handler) = fixture();
    let handler = Arc::new(handler);
    let shutdown = handler.shutdown_handle();

    let running = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.run(Arc::new(|_req| Ok(None))).await })
    };
    wait_until(|| async { client.is_connected().await }).await;

    shutdown.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run did not return after shutdown")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(client.disconnect_calls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_even_when_start_fails() {
    let (client, _platform, handler) = fixture();
    client.fail_connects(CONNECT_MAX_ATTEMPTS).await;

    let err = handler.run(Arc::new(|_req| Ok(None))).await.unwrap_err();

    assert!(matches!(err, BusError::Connection(_)));
    assert_eq!(client.disconnect_calls().await, 1);
}
