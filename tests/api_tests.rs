//! End-to-end tests of the probe endpoint.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`. Admission
//! and authorization tests use a counting executor; HTTP probe tests use the
//! real executor against a local responder.
//!
//! Run with: cargo test --test api_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::routing::any;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use hostprobe::config::AppConfig;
use hostprobe::dispatch::Dispatcher;
use hostprobe::middleware::REQUEST_ID_HEADER;
use hostprobe::probe::{ProbeError, ProbeExecutor, Scheme, SystemProber};
use hostprobe::routes::create_router;
use hostprobe::state::AppState;

/// Executor that counts calls and can park every probe until released
struct CountingExecutor {
    calls: AtomicUsize,
    hold: Option<Arc<Semaphore>>,
    entered: mpsc::UnboundedSender<()>,
}

impl CountingExecutor {
    fn new(hold: Option<Arc<Semaphore>>) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (entered, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                hold,
                entered,
            }),
            rx,
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.send(());
        if let Some(hold) = &self.hold {
            hold.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl ProbeExecutor for CountingExecutor {
    async fn ping(&self, host: &str, _cancel: &CancellationToken) -> Result<f64, ProbeError> {
        self.enter().await;
        if host.starts_with("10.255.") {
            Err(ProbeError::PingFailed)
        } else {
            Ok(0.045)
        }
    }

    async fn http(
        &self,
        _host: &str,
        _scheme: Scheme,
        _cancel: &CancellationToken,
    ) -> Result<u16, ProbeError> {
        self.enter().await;
        Ok(200)
    }
}

fn config(api_key: Option<&str>, limit: i64) -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.api_key = api_key.map(str::to_string);
    config.limits.concurrency_limit = Some(toml::Value::Integer(limit));
    config
}

fn app_with(config: AppConfig, executor: Arc<dyn ProbeExecutor>) -> (Router, Dispatcher) {
    let dispatcher = Dispatcher::new(&config, executor);
    let state = AppState::new(Arc::new(config), dispatcher.clone());
    (create_router(state), dispatcher)
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn spawn_responder(status: StatusCode) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(any(move || async move { status }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

// =============================================================================
// Authorization and validation
// =============================================================================

#[tokio::test]
async fn test_wrong_key_is_forbidden_and_never_probes() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(Some("s3cret"), 5), executor.clone());

    for uri in [
        "/?host=example.com",
        "/?host=example.com&key=nope",
        "/?host=example.com&key=S3CRET&method=https",
    ] {
        let (status, body) = call(app.clone(), uri).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["error"], "Auth failed");
        assert_eq!(body["result"], 0);
    }

    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_correct_key_is_served() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(Some("s3cret"), 5), executor.clone());

    let (status, body) = call(app, "/?key=s3cret&host=example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"host": "example.com", "type": "ping", "result": 0.045})
    );
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_missing_host_is_bad_request_for_every_method() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(None, 5), executor.clone());

    for uri in ["/", "/?host=", "/?method=http", "/?host=&method=https", "/?%zz"] {
        let (status, body) = call(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "host required");
    }
    assert_eq!(executor.calls(), 0);
}

// =============================================================================
// Method selection and response shape
// =============================================================================

#[tokio::test]
async fn test_unknown_method_falls_back_to_ping() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(None, 5), executor);

    let (status, body) = call(app, "/any/path?host=example.com&method=tcp").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "ping");
}

#[tokio::test]
async fn test_probe_failure_is_ok_with_error_field() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(None, 5), executor);

    let (status, body) = call(app, "/?host=10.255.255.1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "host": "10.255.255.1",
            "type": "ping",
            "result": 0,
            "error": "ping failed: host unreachable or timeout"
        })
    );
}

#[tokio::test]
async fn test_responses_are_json_with_request_id() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(None, 5), executor);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/?host=example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn test_repeated_requests_keep_the_same_shape() {
    let (executor, _rx) = CountingExecutor::new(None);
    let (app, _) = app_with(config(None, 5), executor);

    for _ in 0..3 {
        let (status, body) = call(app.clone(), "/?host=example.com&method=http").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["host"], "example.com");
        assert_eq!(body["type"], "http");
        assert!(body["result"].as_u64().is_some());
        assert!(body.get("error").is_none());
    }
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn test_one_request_past_capacity_gets_503() {
    const CAPACITY: usize = 4;
    let hold = Arc::new(Semaphore::new(0));
    let (executor, mut entered) = CountingExecutor::new(Some(hold.clone()));
    let (app, dispatcher) = app_with(config(None, CAPACITY as i64), executor.clone());

    let running: Vec<_> = (0..CAPACITY)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move { call(app, &format!("/?host=host-{}", i)).await })
        })
        .collect();
    for _ in 0..CAPACITY {
        entered.recv().await.unwrap();
    }

    let (status, body) = call(app.clone(), "/?host=overflow").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Server is too busy, try again later");
    assert_eq!(body["host"], "overflow");

    hold.add_permits(CAPACITY);
    for handle in running {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(executor.calls(), CAPACITY);
    assert_eq!(dispatcher.gate().in_use(), 0);
}

#[tokio::test]
async fn test_handler_deadline_releases_slot() {
    let hold = Arc::new(Semaphore::new(0));
    let (executor, _rx) = CountingExecutor::new(Some(hold));
    let mut config = config(None, 1);
    config.http.request_timeout_seconds = 1;
    let (app, dispatcher) = app_with(config, executor);

    let (status, body) = call(app, "/?host=example.com").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body, Value::Null);
    assert_eq!(dispatcher.gate().in_use(), 0);
}

// =============================================================================
// HTTP probe against a live responder
// =============================================================================

#[tokio::test]
async fn test_http_probe_reports_served_status() {
    let host = spawn_responder(StatusCode::NO_CONTENT).await;
    let config = config(None, 5);
    let prober = SystemProber::new(&config.probe).unwrap();
    let (app, _) = app_with(config, Arc::new(prober));

    let (status, body) = call(app, &format!("/?host=http://{}&method=http", host)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"host": format!("http://{}", host), "type": "http", "result": 204})
    );
}

#[tokio::test]
async fn test_http_probe_transport_failure_is_reported_in_body() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = config(None, 5);
    let prober = SystemProber::new(&config.probe).unwrap();
    let (app, _) = app_with(config, Arc::new(prober));

    let (status, body) = call(app, &format!("/?host={}&method=http", addr)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 0);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_https_method_reaches_tls_client() {
    let host = spawn_responder(StatusCode::NO_CONTENT).await;
    let config = config(None, 5);
    let prober = SystemProber::new(&config.probe).unwrap();
    let (app, dispatcher) = app_with(config, Arc::new(prober));

    // Plain-HTTP responder, so the TLS handshake has to fail
    let (status, body) = call(app, &format!("/?host=http://{}&method=https", host)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["host"], format!("http://{}", host));
    assert_eq!(body["type"], "https");
    assert_eq!(body["result"], 0);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert_eq!(dispatcher.gate().in_use(), 0);
}

#[tokio::test]
async fn test_deadline_cancels_slow_http_probe() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let slow = Router::new().fallback(any(|| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        StatusCode::OK
    }));
    tokio::spawn(async move {
        axum::serve(listener, slow).await.unwrap();
    });

    let mut config = config(None, 1);
    config.http.request_timeout_seconds = 1;
    let prober = SystemProber::new(&config.probe).unwrap();
    let (app, dispatcher) = app_with(config, Arc::new(prober));

    let (status, _) = call(app, &format!("/?host={}&method=http", addr)).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(dispatcher.gate().in_use(), 0);
}
