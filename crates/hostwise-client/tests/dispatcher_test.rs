//! Dispatcher Behaviour Tests
//!
//! Drives a [`Connection`] against a scripted in-memory cluster so that
//! host selection, retries, redirects and the concurrency ceiling can be
//! checked deterministically. Each host's answer is decided by a handler
//! closure; every send is logged with the URL and headers it carried.

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use hostwise_client::{ClientConfig, Connection, LoadBalancingStrategy, RetryPolicy};
use hostwise_common::protocol::headers::{
    ALLOW_DIRTY_READ, LEADER_ENDPOINT, PROTOCOL_VERSION, QUEUE_TIME_SECONDS, TRANSACTION_ID,
};
use hostwise_common::transport::{
    ConnectionOptions, HostTransport, TransportFactory, TransportRequest, TransportResponse,
};
use hostwise_common::{HeaderMap, HostwiseError, Method, RequestOptions, StatusCode, TransportError};
use http::header::{HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted cluster
// ============================================================================

enum Scripted {
    Reply(TransportResponse),
    Refuse,
    Fail(TransportError),
}

type Handler = Arc<dyn Fn(&str, &TransportRequest) -> Scripted + Send + Sync>;

#[derive(Debug, Clone)]
struct Sent {
    url: String,
    path: String,
    headers: HeaderMap,
}

#[derive(Clone)]
struct MockCluster {
    handler: Handler,
    delay: Duration,
    sent: Arc<Mutex<Vec<Sent>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockCluster {
    fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &TransportRequest) -> Scripted + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            delay: Duration::ZERO,
            sent: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_urls(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.url).collect()
    }

    async fn connect(&self, config: ClientConfig) -> Connection {
        Connection::with_transport_factory(config, Arc::new(self.clone()))
            .await
            .expect("connection should start")
    }
}

struct MockTransport {
    url: String,
    cluster: MockCluster,
}

impl HostTransport for MockTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        // Logged at dispatch time so the order matches host selection
        self.cluster.sent.lock().unwrap().push(Sent {
            url: self.url.clone(),
            path: request.path_and_query.clone(),
            headers: request.headers.clone(),
        });
        let now = self.cluster.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.cluster.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let cluster = self.cluster.clone();
        let url = self.url.clone();

        Box::pin(async move {
            if !cluster.delay.is_zero() {
                tokio::time::sleep(cluster.delay).await;
            }
            cluster.in_flight.fetch_sub(1, Ordering::SeqCst);

            match (cluster.handler)(&url, &request) {
                Scripted::Reply(response) => Ok(response),
                Scripted::Refuse => Err(TransportError::ConnectionRefused { url }),
                Scripted::Fail(error) => Err(error),
            }
        })
    }
}

impl TransportFactory for MockCluster {
    fn create(
        &self,
        url: &str,
        _options: &ConnectionOptions,
    ) -> hostwise_common::Result<Arc<dyn HostTransport>> {
        if !url.contains("://") {
            return Err(HostwiseError::invalid_url(url, "missing protocol"));
        }
        Ok(Arc::new(MockTransport {
            url: url.to_string(),
            cluster: self.clone(),
        }))
    }
}

fn json_reply(status: u16, body: Value) -> Scripted {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Scripted::Reply(TransportResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers,
        body: Bytes::from(serde_json::to_vec(&body).unwrap()),
    })
}

fn ok_reply(url: &str) -> Scripted {
    json_reply(200, json!({ "url": url }))
}

fn hosts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("http://db{}:8529", i)).collect()
}

fn get() -> RequestOptions {
    RequestOptions::new(Method::GET).path("/_api/version")
}

// ============================================================================
// Host selection
// ============================================================================

#[tokio::test]
async fn test_round_robin_visits_hosts_in_order() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_urls(hosts(3))
                .with_load_balancing(LoadBalancingStrategy::RoundRobin),
        )
        .await;

    let mut served = Vec::new();
    for _ in 0..4 {
        served.push(connection.request(get()).await.unwrap().served_by);
    }

    assert_eq!(served, vec![0, 1, 2, 0]);
}

#[tokio::test]
async fn test_none_strategy_sticks_to_first_host() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(3)))
        .await;

    for _ in 0..3 {
        assert_eq!(connection.request(get()).await.unwrap().served_by, 0);
    }
}

#[tokio::test]
async fn test_pinned_host_is_used_exactly() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_urls(hosts(3))
                .with_load_balancing(LoadBalancingStrategy::RoundRobin),
        )
        .await;

    let response = connection.request(get().host(2)).await.unwrap();
    assert_eq!(response.served_by, 2);

    // Pinning did not move the round robin pointer
    assert_eq!(connection.request(get()).await.unwrap().served_by, 0);
}

#[tokio::test]
async fn test_pinned_host_out_of_range_is_rejected() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(2)))
        .await;

    let err = connection.request(get().host(5)).await.unwrap_err();
    assert!(matches!(err, HostwiseError::InvalidRequest(_)));
    assert!(cluster.sent().is_empty());
}

#[tokio::test]
async fn test_dirty_reads_rotate_and_carry_header() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(2)))
        .await;

    let first = connection.request(get().allow_dirty_read(true)).await.unwrap();
    let second = connection.request(get().allow_dirty_read(true)).await.unwrap();
    let regular = connection.request(get()).await.unwrap();

    assert_eq!(first.served_by, 0);
    assert_eq!(second.served_by, 1);
    assert_eq!(regular.served_by, 0);

    let sent = cluster.sent();
    assert_eq!(sent[0].headers.get(ALLOW_DIRTY_READ).unwrap(), "true");
    assert_eq!(sent[1].headers.get(ALLOW_DIRTY_READ).unwrap(), "true");
    assert!(sent[2].headers.get(ALLOW_DIRTY_READ).is_none());
}

// ============================================================================
// Retries and failover
// ============================================================================

#[tokio::test]
async fn test_connection_refused_is_retried_on_next_host() {
    let cluster = MockCluster::new(|url, _| {
        if url == "http://db0:8529" {
            Scripted::Refuse
        } else {
            ok_reply(url)
        }
    });
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(2)))
        .await;

    let response = connection.request(get()).await.unwrap();
    assert_eq!(response.served_by, 1);
    assert_eq!(
        cluster.sent_urls(),
        vec!["http://db0:8529".to_string(), "http://db1:8529".to_string()]
    );

    // Failover moved the active host, so the next request skips db0
    assert_eq!(connection.stats().await.unwrap().active_host, 1);
    assert_eq!(connection.request(get()).await.unwrap().served_by, 1);
    assert_eq!(cluster.sent().len(), 3);
}

#[tokio::test]
async fn test_retry_bound_exceeded_surfaces_refusal() {
    let cluster = MockCluster::new(|_, _| Scripted::Refuse);
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(3)))
        .await;

    let err = connection.request(get()).await.unwrap_err();
    match err {
        HostwiseError::Transport(e) => assert!(e.is_connection_refused()),
        other => panic!("Expected transport error, got {:?}", other),
    }

    // One attempt per host: the initial one plus host_count - 1 retries
    assert_eq!(cluster.sent().len(), 3);
}

#[tokio::test]
async fn test_bounded_and_disabled_retry_policies() {
    let cluster = MockCluster::new(|_, _| Scripted::Refuse);
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_urls(hosts(2))
                .with_retry(RetryPolicy::Bounded(4)),
        )
        .await;
    assert!(connection.request(get()).await.is_err());
    assert_eq!(cluster.sent().len(), 5);

    let cluster = MockCluster::new(|_, _| Scripted::Refuse);
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_urls(hosts(2))
                .with_retry(RetryPolicy::Disabled),
        )
        .await;
    assert!(connection.request(get()).await.is_err());
    assert_eq!(cluster.sent().len(), 1);
}

#[tokio::test]
async fn test_pinned_request_is_not_retried() {
    let cluster = MockCluster::new(|_, _| Scripted::Refuse);
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(3)))
        .await;

    assert!(connection.request(get().host(1)).await.is_err());
    assert_eq!(cluster.sent_urls(), vec!["http://db1:8529".to_string()]);
}

#[tokio::test]
async fn test_timeout_is_not_retried_but_fails_over() {
    let cluster = MockCluster::new(|url, _| {
        Scripted::Fail(TransportError::Timeout {
            url: url.to_string(),
            timeout_ms: 50,
        })
    });
    let connection = cluster
        .connect(ClientConfig::default().with_urls(hosts(2)))
        .await;

    let err = connection.request(get()).await.unwrap_err();
    assert!(matches!(
        err,
        HostwiseError::Transport(TransportError::Timeout { .. })
    ));
    assert_eq!(cluster.sent().len(), 1);
    assert_eq!(connection.stats().await.unwrap().active_host, 1);
}

#[tokio::test]
async fn test_round_robin_retry_does_not_fail_over() {
    let cluster = MockCluster::new(|url, _| {
        if url == "http://db0:8529" {
            Scripted::Refuse
        } else {
            ok_reply(url)
        }
    });
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_urls(hosts(2))
                .with_load_balancing(LoadBalancingStrategy::RoundRobin),
        )
        .await;

    // db0 refuses, the retry picks the next round robin host
    assert_eq!(connection.request(get()).await.unwrap().served_by, 1);
    // Pointer has wrapped back to db0
    assert_eq!(connection.stats().await.unwrap().active_host, 0);
}

// ============================================================================
// Leader redirects
// ============================================================================

#[tokio::test]
async fn test_leader_redirect_is_followed() {
    let cluster = MockCluster::new(|url, _| {
        if url == "http://leader:8529" {
            ok_reply(url)
        } else {
            let mut headers = HeaderMap::new();
            headers.insert(LEADER_ENDPOINT, HeaderValue::from_static("tcp://leader:8529"));
            Scripted::Reply(TransportResponse {
                status: StatusCode::SERVICE_UNAVAILABLE,
                headers,
                body: Bytes::new(),
            })
        }
    });
    let connection = cluster
        .connect(ClientConfig::default().with_urls(["http://follower:8529"]))
        .await;

    let response = connection.request(get()).await.unwrap();
    assert_eq!(response.served_by, 1);
    assert_eq!(response.json().unwrap()["url"], "http://leader:8529");

    assert_eq!(
        connection.host_urls().await.unwrap(),
        vec![
            "http://follower:8529".to_string(),
            "http://leader:8529".to_string()
        ]
    );

    // Later requests go straight to the leader
    let stats = connection.stats().await.unwrap();
    assert_eq!(stats.active_host, 1);
    assert_eq!(connection.request(get()).await.unwrap().served_by, 1);
    assert_eq!(cluster.sent().len(), 3);
}

// ============================================================================
// Response classification
// ============================================================================

#[tokio::test]
async fn test_application_error_with_status_200() {
    let cluster = MockCluster::new(|_, _| {
        json_reply(
            200,
            json!({"error": true, "code": 400, "errorMessage": "bad parameter", "errorNum": 10}),
        )
    });
    let connection = cluster.connect(ClientConfig::default()).await;

    match connection.request(get()).await.unwrap_err() {
        HostwiseError::Application(e) => {
            assert_eq!(e.error_num, 10);
            assert_eq!(e.message, "bad parameter");
            assert_eq!(e.status, 200);
        }
        other => panic!("Expected application error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_carries_status() {
    let cluster = MockCluster::new(|_, _| json_reply(404, json!({"missing": true})));
    let connection = cluster.connect(ClientConfig::default()).await;

    let err = connection.request(get()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(matches!(err, HostwiseError::Http { .. }));

    // The dispatcher stays usable after a failure
    assert!(matches!(
        connection.request(get()).await.unwrap_err(),
        HostwiseError::Http { status: 404, .. }
    ));
}

#[tokio::test]
async fn test_conflict_retry_is_opt_in() {
    let conflict = || {
        json_reply(
            409,
            json!({"error": true, "code": 409, "errorMessage": "conflict", "errorNum": 1200}),
        )
    };

    // Without a conflict budget the first conflict is final
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cluster = MockCluster::new(move |url, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            conflict()
        } else {
            ok_reply(url)
        }
    });
    let connection = cluster.connect(ClientConfig::default()).await;
    match connection.request(get()).await.unwrap_err() {
        HostwiseError::Application(e) => assert!(e.is_conflict()),
        other => panic!("Expected conflict, got {:?}", other),
    }

    // With one retry allowed the second attempt succeeds
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cluster = MockCluster::new(move |url, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            conflict()
        } else {
            ok_reply(url)
        }
    });
    let connection = cluster.connect(ClientConfig::default()).await;
    assert!(connection.request(get().retry_on_conflict(1)).await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Concurrency ceiling
// ============================================================================

#[tokio::test]
async fn test_ceiling_limits_requests_in_flight() {
    let cluster =
        MockCluster::new(|url, _| ok_reply(url)).with_delay(Duration::from_millis(50));
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_max_sockets(2)
                .with_keep_alive(false),
        )
        .await;

    let requests = (0..5).map(|_| connection.request(get()));
    let results = future::join_all(requests).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(cluster.max_in_flight.load(Ordering::SeqCst), 2);

    let stats = connection.stats().await.unwrap();
    assert_eq!(stats.executing, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.max_concurrency, 2);
}

#[tokio::test]
async fn test_keep_alive_doubles_ceiling() {
    let cluster =
        MockCluster::new(|url, _| ok_reply(url)).with_delay(Duration::from_millis(50));
    let connection = cluster
        .connect(ClientConfig::default().with_max_sockets(2))
        .await;

    let results = future::join_all((0..8).map(|_| connection.request(get()))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(cluster.max_in_flight.load(Ordering::SeqCst), 4);
}

// ============================================================================
// Connection controls
// ============================================================================

#[tokio::test]
async fn test_default_and_custom_headers() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_header("x-team", "core")
                .with_max_queue_time(1.5),
        )
        .await;

    connection.request(get()).await.unwrap();
    connection.set_header("x-team", "infra").unwrap();
    connection.set_header("x-extra", "1").unwrap();
    connection
        .request(get().header("x-extra", "override"))
        .await
        .unwrap();
    connection.remove_header("x-team").unwrap();
    connection.request(get()).await.unwrap();

    let sent = cluster.sent();
    assert_eq!(sent[0].headers.get(PROTOCOL_VERSION).unwrap(), "30000");
    assert_eq!(sent[0].headers.get(QUEUE_TIME_SECONDS).unwrap(), "1.5");
    assert_eq!(sent[0].headers.get("x-team").unwrap(), "core");
    assert_eq!(sent[1].headers.get("x-team").unwrap(), "infra");
    assert_eq!(sent[1].headers.get("x-extra").unwrap(), "override");
    assert!(sent[2].headers.get("x-team").is_none());
    assert_eq!(sent[2].headers.get("x-extra").unwrap(), "1");
}

#[tokio::test]
async fn test_transaction_id_header() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster.connect(ClientConfig::default()).await;

    connection.set_transaction_id("12345").unwrap();
    connection.request(get()).await.unwrap();
    connection.clear_transaction_id().unwrap();
    connection.request(get()).await.unwrap();

    let sent = cluster.sent();
    assert_eq!(sent[0].headers.get(TRANSACTION_ID).unwrap(), "12345");
    assert!(sent[1].headers.get(TRANSACTION_ID).is_none());
}

#[tokio::test]
async fn test_request_path_and_query_reach_transport() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster.connect(ClientConfig::default()).await;

    connection
        .request(
            RequestOptions::new(Method::GET)
                .base_path("/_db/app")
                .path("/_api/document/users/1")
                .query_param("rev", "abc"),
        )
        .await
        .unwrap();

    assert_eq!(cluster.sent()[0].path, "/_db/app/_api/document/users/1?rev=abc");
}

#[tokio::test]
async fn test_add_hosts_is_idempotent() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster
        .connect(ClientConfig::default().with_urls(["http://db0:8529"]))
        .await;

    let first = connection.add_hosts(["tcp://db1:8529"]).await.unwrap();
    let second = connection
        .add_hosts(["http://db1:8529", "http://db0:8529"])
        .await
        .unwrap();

    assert_eq!(first, vec![1]);
    assert_eq!(second, vec![1, 0]);
    assert_eq!(connection.stats().await.unwrap().host_count, 2);

    let err = connection.add_hosts(["db2:8529"]).await.unwrap_err();
    assert!(matches!(err, HostwiseError::InvalidUrl { .. }));
}

#[tokio::test]
async fn test_default_url_is_used_without_config() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let connection = cluster.connect(ClientConfig::default()).await;

    assert_eq!(
        connection.host_urls().await.unwrap(),
        vec!["http://127.0.0.1:8529".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_url_fails_construction() {
    let cluster = MockCluster::new(|url, _| ok_reply(url));
    let result = Connection::with_transport_factory(
        ClientConfig::default().with_urls(["localhost:8529"]),
        Arc::new(cluster),
    )
    .await;

    assert!(matches!(result, Err(HostwiseError::InvalidUrl { .. })));
}

#[tokio::test]
async fn test_queue_time_samples_are_recorded() {
    let cluster = MockCluster::new(|_, _| {
        let mut headers = HeaderMap::new();
        headers.insert(QUEUE_TIME_SECONDS, HeaderValue::from_static("0.5"));
        Scripted::Reply(TransportResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
        })
    });
    let connection = cluster.connect(ClientConfig::default()).await;

    connection.request(get()).await.unwrap();
    connection.request(get()).await.unwrap();

    let queue_time = connection.queue_time().await.unwrap();
    assert_eq!(queue_time.latest, Some(0.5));
    assert_eq!(queue_time.values.len(), 2);
    assert_eq!(queue_time.average, 0.5);
}

#[tokio::test]
async fn test_close_rejects_queued_and_later_requests() {
    let cluster =
        MockCluster::new(|url, _| ok_reply(url)).with_delay(Duration::from_millis(200));
    let connection = cluster
        .connect(
            ClientConfig::default()
                .with_max_sockets(1)
                .with_keep_alive(false),
        )
        .await;

    let in_flight = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.request(get()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let queued = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.request(get()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(connection.stats().await.unwrap().queued, 1);
    connection.close().await.unwrap();

    assert!(matches!(
        queued.await.unwrap(),
        Err(HostwiseError::Closed)
    ));
    assert!(in_flight.await.unwrap().is_ok());

    assert!(matches!(
        connection.request(get()).await,
        Err(HostwiseError::Closed)
    ));

    // Closing again is harmless
    connection.close().await.unwrap();
}
