// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;
use crate::error::AttemptFailure;
use crate::resources::TaskState;
use crate::runtime::{CustomRetryStrategy, OperationState};
use crate::testkit::{ManualClock, MockReply, MockTransport};
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const HITS: &str = r#"{"hits":[],"nbHits":0}"#;

fn three_hosts() -> Vec<HostConfig> {
    vec![
        HostConfig::any("host-1"),
        HostConfig::any("host-2"),
        HostConfig::any("host-3"),
    ]
}

fn client_with(hosts: Vec<HostConfig>, transport: &Arc<MockTransport>) -> SearchClient {
    let config = ClientConfig::builder("APP", "secret-key")
        .hosts(hosts)
        .build()
        .unwrap();
    SearchClient::new(config, Arc::clone(transport) as Arc<dyn Transport>).unwrap()
}

fn query() -> Command {
    Command::get("/1/indexes/products/query")
}

#[test]
fn test_default_config() {
    let config = ClientConfig::new("MyApp", "key");

    assert_eq!(config.read_timeout, Duration::from_secs(5));
    assert_eq!(config.write_timeout, Duration::from_secs(30));
    assert_eq!(config.host_expiry, Duration::from_secs(300));
    assert_eq!(config.max_concurrent_operations, 16);
    assert_eq!(config.task_poll_interval, Duration::from_secs(1));

    assert_eq!(config.hosts.len(), 5);
    assert_eq!(config.hosts[0], HostConfig::read("myapp-dsn.search-api.net"));
    assert_eq!(config.hosts[1], HostConfig::write("myapp.search-api.net"));

    let mut fallback: Vec<_> = config.hosts[2..].iter().map(|h| h.url.clone()).collect();
    fallback.sort();
    assert_eq!(
        fallback,
        vec![
            "myapp-1.searchnet.com",
            "myapp-2.searchnet.com",
            "myapp-3.searchnet.com"
        ]
    );
    assert!(config.hosts[2..]
        .iter()
        .all(|h| h.accept == HostAffinity::Any));
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation() {
    let empty_key = ClientConfig::builder("APP", "").build();
    assert!(matches!(empty_key, Err(SearchError::Config(_))));

    let no_hosts = ClientConfig::builder("APP", "key").hosts(Vec::new()).build();
    assert!(matches!(no_hosts, Err(SearchError::Config(_))));

    let zero_timeout = ClientConfig::builder("APP", "key")
        .read_timeout(Duration::ZERO)
        .build();
    assert!(matches!(zero_timeout, Err(SearchError::Config(_))));

    let bad_host = ClientConfig::builder("APP", "key")
        .hosts(vec![HostConfig::any("host-1"), HostConfig::any("bad host")])
        .build();
    assert!(matches!(bad_host, Err(SearchError::Config(_))));

    let busy_loop = ClientConfig::builder("APP", "key")
        .task_poll_interval(Duration::ZERO)
        .build();
    assert!(matches!(busy_loop, Err(SearchError::Config(_))));
}

#[test]
fn test_config_debug_redacts_key() {
    let config = ClientConfig::new("APP", "super-secret");
    let debug = format!("{config:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("[REDACTED]"));
}

#[tokio::test]
async fn test_fails_over_until_success() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::status(503))
        .always("host-2", MockReply::refused())
        .always("host-3", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let body: Value = client.execute(&query()).await.unwrap();

    assert_eq!(body["nbHits"], 0);
    assert_eq!(
        transport.attempted_hosts(),
        vec!["host-1", "host-2", "host-3"]
    );
    let hosts = client.pool().hosts();
    assert!(!hosts[0].is_up());
    assert_eq!(hosts[0].failure_count(), 1);
    assert!(!hosts[1].is_up());
    assert!(hosts[2].is_up());
    assert_eq!(hosts[2].failure_count(), 0);
    assert_eq!(client.metrics().total_attempts(), 3);
    assert_eq!(client.metrics().successful_attempts(), 1);
}

#[tokio::test]
async fn test_rejected_request_is_not_retried() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always(
            "host-1",
            MockReply::Status(401, r#"{"message":"Invalid API key"}"#.to_string()),
        )
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let err = client.execute::<Value>(&query()).await.unwrap_err();

    match err {
        SearchError::Api {
            host,
            status,
            message,
        } => {
            assert_eq!(host, "host-1");
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(message, "Invalid API key");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.attempted_hosts(), vec!["host-1"]);
    let host = client.pool().host(0).unwrap();
    assert!(host.is_up());
    assert_eq!(host.failure_count(), 0);
}

#[tokio::test]
async fn test_exhaustion_aggregates_every_attempt() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::status(500))
        .always("host-2", MockReply::timeout())
        .always("host-3", MockReply::refused());
    let client = client_with(three_hosts(), &transport);

    let err = client.execute::<Value>(&query()).await.unwrap_err();

    let attempts = err.attempts();
    assert_eq!(attempts.len(), 3);
    let hosts: Vec<_> = attempts.iter().map(|a| a.host.as_str()).collect();
    assert_eq!(hosts, vec!["host-1", "host-2", "host-3"]);
    assert!(matches!(
        attempts[0].failure,
        AttemptFailure::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            ..
        }
    ));
    assert_eq!(
        attempts[1].failure,
        AttemptFailure::Transport(TransportError::Timeout)
    );
    assert!(matches!(
        attempts[2].failure,
        AttemptFailure::Transport(TransportError::Connect(_))
    ));
    assert!(err.is_retryable());

    let timed_out = client.pool().host(1).unwrap();
    assert_eq!(timed_out.last_failure_kind(), Some(FailureKind::TimedOut));
    assert_eq!(client.pool().up_count(), 0);
}

#[tokio::test]
async fn test_no_host_for_call_type() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with(vec![HostConfig::read("host-1")], &transport);

    let command = Command::write(Method::POST, "/1/indexes/products").with_body("{}");
    let err = client.execute::<Value>(&command).await.unwrap_err();

    assert!(matches!(
        err,
        SearchError::NoHostsAvailable {
            call_type: CallType::Write
        }
    ));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_affinity_orders_candidates() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("read-host", MockReply::ok(HITS))
        .always("write-host", MockReply::ok(r#"{"taskID":1}"#))
        .always("shared-host", MockReply::ok(HITS));
    let client = client_with(
        vec![
            HostConfig::read("read-host"),
            HostConfig::write("write-host"),
            HostConfig::any("shared-host"),
        ],
        &transport,
    );

    let _: Value = client.execute(&query()).await.unwrap();
    let _: Value = client
        .execute(&Command::write(Method::POST, "/1/indexes/products"))
        .await
        .unwrap();

    assert_eq!(
        transport.attempted_hosts(),
        vec!["read-host", "write-host"]
    );
}

#[tokio::test]
async fn test_down_host_skipped_by_next_call() {
    let transport = Arc::new(MockTransport::new());
    transport
        .push("host-1", MockReply::status(502))
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let _: Value = client.execute(&query()).await.unwrap();
    let _: Value = client.execute(&query()).await.unwrap();

    assert_eq!(
        transport.attempted_hosts(),
        vec!["host-1", "host-2", "host-2"]
    );
}

#[tokio::test]
async fn test_timeout_widens_with_failures() {
    let transport = Arc::new(MockTransport::new());
    transport
        .push("host-1", MockReply::timeout())
        .push("host-1", MockReply::timeout())
        .always("host-1", MockReply::ok(HITS));
    let client = client_with(vec![HostConfig::any("host-1")], &transport);

    assert!(client.execute::<Value>(&query()).await.is_err());
    assert!(client.execute::<Value>(&query()).await.is_err());
    let _: Value = client.execute(&query()).await.unwrap();

    let timeouts: Vec<_> = transport.calls().iter().map(|c| c.timeout).collect();
    assert_eq!(
        timeouts,
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(15)
        ]
    );

    // success resets the widening
    let _: Value = client.execute(&query()).await.unwrap();
    assert_eq!(transport.calls()[3].timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn test_expired_host_back_on_probation() {
    let transport = Arc::new(MockTransport::new());
    transport
        .push("host-1", MockReply::status(503))
        .always("host-1", MockReply::ok(HITS))
        .always("host-2", MockReply::ok(HITS));
    let clock = Arc::new(ManualClock::new());
    let client = client_with(
        vec![HostConfig::any("host-1"), HostConfig::any("host-2")],
        &transport,
    )
    .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);

    let _: Value = client.execute(&query()).await.unwrap();
    clock.advance(Duration::from_secs(299));
    let _: Value = client.execute(&query()).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let _: Value = client.execute(&query()).await.unwrap();

    assert_eq!(
        transport.attempted_hosts(),
        vec!["host-1", "host-2", "host-2", "host-1"]
    );
    // probation keeps the failure count for the first attempt
    assert_eq!(transport.calls()[3].timeout, Duration::from_secs(10));
    assert_eq!(client.pool().host(0).unwrap().failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_host_times_out_and_fails_over() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::ok(HITS).after(Duration::from_secs(60)))
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let _: Value = client.execute(&query()).await.unwrap();

    assert_eq!(transport.attempted_hosts(), vec!["host-1", "host-2"]);
    let slow = client.pool().host(0).unwrap();
    assert_eq!(slow.last_failure_kind(), Some(FailureKind::TimedOut));
}

#[tokio::test]
async fn test_per_call_timeout_and_headers() {
    let transport = Arc::new(MockTransport::new());
    transport.always("host-1", MockReply::ok(HITS));
    let config = ClientConfig::builder("APP", "secret-key")
        .hosts(vec![HostConfig::any("host-1")])
        .default_header(
            HeaderName::from_static("x-client"),
            HeaderValue::from_static("search-api-rs"),
        )
        .default_header(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_static("overridden-by-credentials"),
        )
        .build()
        .unwrap();
    let client = SearchClient::new(config, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();

    let command = query().with_options(
        RequestOptions::new()
            .with_timeout(Duration::from_secs(2))
            .with_header(
                HeaderName::from_static(APPLICATION_ID_HEADER),
                HeaderValue::from_static("OTHER"),
            ),
    );
    let _: Value = client.execute(&command).await.unwrap();

    let call = &transport.calls()[0];
    assert_eq!(call.timeout, Duration::from_secs(2));
    assert_eq!(call.headers["x-client"], "search-api-rs");
    assert_eq!(call.headers[API_KEY_HEADER], "secret-key");
    assert_eq!(call.headers[APPLICATION_ID_HEADER], "OTHER");
}

#[tokio::test]
async fn test_undecodable_body_is_terminal() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::ok("<html>maintenance</html>"))
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let err = client.execute::<Value>(&query()).await.unwrap_err();

    assert!(matches!(err, SearchError::Decode(_)));
    assert_eq!(transport.attempted_hosts(), vec!["host-1"]);
}

#[tokio::test]
async fn test_custom_strategy_retries_on_not_found() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::status(404))
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport).with_strategy(Arc::new(
        CustomRetryStrategy::new(vec![StatusCode::NOT_FOUND]),
    ));

    let _: Value = client.execute(&query()).await.unwrap();
    assert_eq!(transport.attempted_hosts(), vec!["host-1", "host-2"]);
}

#[tokio::test]
async fn test_cancel_before_attempt() {
    let transport = Arc::new(MockTransport::new());
    transport.always("host-1", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .execute_with::<Value>(&query(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Cancelled));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_launch_delivers_result_once() {
    let transport = Arc::new(MockTransport::new());
    transport.always("host-1", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = client.launch::<Value, _>(query(), move |result| {
        let _ = tx.send(result);
    });

    let delivered = rx.await.unwrap().unwrap();
    assert_eq!(delivered["nbHits"], 0);
    assert_eq!(handle.wait().await.unwrap(), delivered);
    assert_eq!(handle.state(), OperationState::Completed);
}

#[tokio::test]
async fn test_cancel_in_flight_keeps_health_feedback() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always(
            "host-1",
            MockReply::status(503).after(Duration::from_millis(100)),
        )
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(None));
    let (counter, sink) = (Arc::clone(&calls), Arc::clone(&seen));
    let handle = client.launch::<Value, _>(query(), move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        *sink.lock().unwrap() = Some(result.is_err());
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state(), OperationState::Running);
    assert!(handle.cancel());

    // let the in-flight attempt finish
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(matches!(handle.wait().await, Err(SearchError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), Some(true));
    assert_eq!(transport.attempted_hosts(), vec!["host-1"]);
    assert!(!client.pool().host(0).unwrap().is_up());
}

#[tokio::test]
async fn test_concurrent_calls_share_health() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::refused())
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client.execute::<Value>(&query()).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    let host = client.pool().host(0).unwrap();
    assert!(!host.is_up());
    assert!(host.failure_count() >= 1);
    assert!(client.pool().host(1).unwrap().is_up());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_task_until_published() {
    let transport = Arc::new(MockTransport::new());
    transport
        .push("host-1", MockReply::ok(r#"{"status":"notPublished"}"#))
        .push("host-1", MockReply::ok(r#"{"status":"notPublished"}"#))
        .always("host-1", MockReply::ok(r#"{"status":"published"}"#));
    let client = client_with(three_hosts(), &transport);

    let status = client
        .wait_for_task(&TaskRef::new("products", 77), Some(Duration::from_secs(30)))
        .await
        .unwrap();

    assert_eq!(status.state, TaskState::Published);
    assert_eq!(transport.call_count(), 3);
    assert!(transport
        .calls()
        .iter()
        .all(|c| c.path == "/1/indexes/products/task/77"));
}

#[tokio::test(start_paused = true)]
async fn test_launch_wait_for_task_times_out() {
    let transport = Arc::new(MockTransport::new());
    transport.always("host-1", MockReply::ok(r#"{"status":"notPublished"}"#));
    let client = client_with(three_hosts(), &transport);

    let handle = client.launch_wait_for_task(
        TaskRef::new("products", 5),
        Some(Duration::from_secs(3)),
        |_| {},
    );

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, SearchError::WaitTimeout { task_id: 5, .. }));
    assert_eq!(transport.call_count(), 3);
}

#[test]
fn test_execute_blocking() {
    let transport = Arc::new(MockTransport::new());
    transport
        .always("host-1", MockReply::timeout())
        .always("host-2", MockReply::ok(HITS));
    let client = client_with(three_hosts(), &transport);

    let body: Value = client.execute_blocking(query()).unwrap();
    assert_eq!(body["hits"], Value::Array(Vec::new()));
    assert_eq!(transport.attempted_hosts(), vec!["host-1", "host-2"]);

    let status = client
        .wait_for_task_blocking(TaskRef::new("products", 1), None)
        .map(|s| s.state);
    assert!(matches!(status, Err(SearchError::Decode(_))));
}

#[tokio::test]
async fn test_execute_blocking_rejects_async_context() {
    let transport = Arc::new(MockTransport::new());
    let client = client_with(three_hosts(), &transport);

    let result = client.execute_blocking::<Value>(query());
    assert!(matches!(result, Err(SearchError::Config(_))));
    assert_eq!(transport.call_count(), 0);
}
