//! Integration tests for the HTTP API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use strata_common::Point;
use strata_server::storage::read_rows;
use strata_server::{
    Config, Metrics, PointWriter, Server, ServerStatus, ShutdownContext, StorageError,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

const REFERENCE_LINE: &str = "cpu,host=server01,region=us-west value=0.64 1434055562000000000";

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.storage.path = dir.path().join("points.tsv");
    config
}

async fn setup_test_server() -> (Server, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(Some(test_config(&dir))).await.unwrap();
    (server, dir)
}

fn post_write(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/write")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(body.into())
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_write_reference_line() {
    let (server, dir) = setup_test_server().await;

    let response = server.router().oneshot(post_write(REFERENCE_LINE)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["points"], 1);
    assert_eq!(json["rows"], 1);

    let rows = read_rows(dir.path().join("points.tsv")).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].measurement, "cpu");
    assert_eq!(rows[0].tags, "host=server01,region=us-west");
    assert_eq!(rows[0].field, "value");
    assert_eq!(rows[0].value, 0.64);
    assert_eq!(rows[0].timestamp.timestamp_nanos_opt(), Some(1434055562000000000));

    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn test_write_multiple_points_and_fields() {
    let (server, dir) = setup_test_server().await;

    let body = "cpu,host=a user=1,system=2 10\n\nmem,host=a used=3i 20\n";
    let (status, json) = send_json(server.router(), post_write(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["points"], 2);
    assert_eq!(json["rows"], 3);
    assert_eq!(read_rows(dir.path().join("points.tsv")).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_invalid_field_value_is_bad_request() {
    let (server, dir) = setup_test_server().await;

    let (status, json) = send_json(
        server.router(),
        post_write("cpu,host=server01 value=abc 1434055562000000000"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Bad Request");
    assert_eq!(json["type"], "validation");
    assert_eq!(json["code"], 400);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("invalid field value 'abc'"));
    assert_eq!(json["context"]["line"], "1");

    assert!(read_rows(dir.path().join("points.tsv")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_line_rejects_whole_batch() {
    let (server, dir) = setup_test_server().await;

    let body = "cpu value=1 10\ncpu value=2 20\ncpu value=3";
    let (status, json) = send_json(server.router(), post_write(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["message"],
        "invalid line format: expected 3 parts, got 2"
    );
    assert_eq!(json["context"]["line"], "3");
    assert!(read_rows(dir.path().join("points.tsv")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_post_is_method_not_allowed() {
    let (server, _dir) = setup_test_server().await;

    for method in ["GET", "PUT", "DELETE"] {
        let request = Request::builder()
            .method(method)
            .uri("/write")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send_json(server.router(), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        assert_eq!(json["code"], 405);
    }
}

#[tokio::test]
async fn test_non_utf8_body_is_bad_request() {
    let (server, _dir) = setup_test_server().await;

    let (status, json) = send_json(server.router(), post_write(vec![0xff, 0xfe, 0x00])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "request body is not valid UTF-8");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.max_body_bytes = 16;
    let server = Server::new(Some(config)).await.unwrap();

    let (status, json) = send_json(server.router(), post_write(REFERENCE_LINE)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["context"]["max_body_bytes"], "16");
}

#[tokio::test]
async fn test_write_after_close_is_storage_error() {
    let (server, _dir) = setup_test_server().await;
    let app = server.router();
    server.close().await;

    let (status, json) = send_json(app, post_write(REFERENCE_LINE)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["type"], "storage");
    assert_eq!(json["context"]["points_written"], "0");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let (server, _dir) = setup_test_server().await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, json) = send_json(server.router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["server_status"], "starting");
    assert_eq!(json["server_status_code"], 1);

    // Not serving yet
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, json) = send_json(server.router(), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "not_ready");

    // Liveness holds even after shutdown
    server.close().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, json) = send_json(server.router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["server_status"], "stopped");
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (server, _dir) = setup_test_server().await;

    let (status, _) = send(server.router(), post_write(REFERENCE_LINE)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(server.router(), post_write("cpu value=x 1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = send(server.router(), request).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("strata_write_requests_total 2"));
    assert!(text.contains("strata_points_written_total 1"));
    assert!(text.contains("strata_parse_errors_total 1"));
    assert!(text.contains("strata_http_requests_total 2"));
}

async fn raw_request(addr: std::net::SocketAddr, request: String) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_serve_over_tcp_and_shutdown() {
    let (server, dir) = setup_test_server().await;
    let server = Arc::new(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    let mut status = server.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == ServerStatus::Running),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(server.is_healthy());

    let response = raw_request(
        addr,
        format!(
            "POST /write HTTP/1.1\r\nHost: localhost\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            REFERENCE_LINE.len(),
            REFERENCE_LINE
        ),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

    let response = raw_request(
        addr,
        "GET /ready HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

    server
        .shutdown(Some(ShutdownContext::with_timeout(Duration::from_secs(5))))
        .await
        .unwrap();
    assert_eq!(server.status(), ServerStatus::Stopped);
    assert!(!server.is_healthy());

    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let rows = read_rows(dir.path().join("points.tsv")).await.unwrap();
    assert_eq!(rows.len(), 1);
}

/// Backend whose behaviour per call is scripted by the test.
enum Behaviour {
    Sleep(Duration),
    FailAt(usize),
    Panic,
}

struct ScriptedStorage {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl ScriptedStorage {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PointWriter for ScriptedStorage {
    async fn write_point(&self, _point: &Point) -> Result<(), StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Sleep(delay) => tokio::time::sleep(delay).await,
            Behaviour::FailAt(n) if call == n => {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            Behaviour::FailAt(_) => {}
            Behaviour::Panic => panic!("storage backend exploded"),
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

fn scripted_server(config: Config, storage: Arc<ScriptedStorage>) -> (Server, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let server = Server::with_storage(config, storage, metrics.clone());
    (server, metrics)
}

#[tokio::test]
async fn test_slow_write_times_out_with_json_body() {
    let config = Config {
        write_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let storage = ScriptedStorage::new(Behaviour::Sleep(Duration::from_secs(2)));
    let (server, _metrics) = scripted_server(config, storage);

    let (status, json) = send_json(server.router(), post_write(REFERENCE_LINE)).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(json["error"], "Request Timeout");
    assert_eq!(json["type"], "timeout");
    assert_eq!(json["code"], 408);
    assert_eq!(json["context"]["write_timeout_ms"], "50");
    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn test_storage_failure_mid_batch_stops_writing() {
    let storage = ScriptedStorage::new(Behaviour::FailAt(2));
    let (server, metrics) = scripted_server(Config::default(), storage.clone());

    let body = "cpu v=1 1\ncpu v=2 2\ncpu v=3 3\ncpu v=4 4";
    let (status, json) = send_json(server.router(), post_write(body)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["type"], "storage");
    assert_eq!(json["context"]["points_written"], "2");
    assert_eq!(json["context"]["points_total"], "4");
    assert!(json["message"].as_str().unwrap().contains("disk full"));
    assert_eq!(storage.calls.load(Ordering::SeqCst), 3);

    let text = metrics.encode();
    assert!(text.contains("strata_points_written_total 2"));
    assert!(text.contains("strata_storage_errors_total 1"));
}

#[tokio::test]
async fn test_handler_panic_becomes_structured_500() {
    let storage = ScriptedStorage::new(Behaviour::Panic);
    let (server, metrics) = scripted_server(Config::default(), storage);

    let (status, json) = send_json(server.router(), post_write(REFERENCE_LINE)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["type"], "internal");
    assert_eq!(json["message"], "internal server error");
    assert_eq!(server.active_connections(), 0);
    assert!(metrics.encode().contains("strata_panics_recovered_total 1"));

    // The router keeps serving after a recovered panic
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(server.router(), request).await;
    assert_eq!(status, StatusCode::OK);
}
