use std::{
    convert::Infallible,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::rt::TokioIo;
use tempfile::tempdir;
use tokio::net::UnixListener;

use sluice_bridge::UpstreamRequest;
use sluice_transport::uds_client::{BackendSettings, ForwardError, UdsBackend};

struct ConcurrencyTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyTracker {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
        }
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves on `path`; every response echoes the Host header and the path,
/// after sleeping `delay`.
fn start_uds_server(path: &Path, delay: Duration, tracker: Arc<ConcurrencyTracker>) {
    let listener = UnixListener::bind(path).unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => break,
            };
            let tracker = tracker.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                let tracker = tracker.clone();
                async move {
                    tracker.enter();
                    tokio::time::sleep(delay).await;
                    tracker.exit();

                    let host = req
                        .headers()
                        .get("host")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let path = req.uri().path().to_string();
                    let body = req.into_body().collect().await.unwrap().to_bytes();

                    let text = format!("{host} {path} {}", body.len());
                    Ok::<_, Infallible>(
                        Response::builder()
                            .header("x-backend", "test")
                            .body(Full::new(Bytes::from(text)))
                            .unwrap(),
                    )
                }
            });

            tokio::spawn(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
}

fn upstream_request(method: Method, uri: &str, body: &'static str) -> UpstreamRequest {
    let (parts, _) = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "public.example")
        .body(())
        .unwrap()
        .into_parts();
    UpstreamRequest::new(parts, Bytes::from_static(body.as_bytes()))
}

fn settings(max_conns: usize) -> BackendSettings {
    BackendSettings {
        max_conns,
        ..BackendSettings::default()
    }
}

#[tokio::test]
async fn forwards_over_unix_socket_with_rewritten_host() {
    let dir = tempdir().unwrap();
    let socket = dir.path().join("api1.sock");
    start_uds_server(&socket, Duration::ZERO, Arc::new(ConcurrencyTracker::new()));

    let backend = UdsBackend::new(&socket, settings(4));
    let req = upstream_request(Method::POST, "http://public.example/payments", "{\"a\":1}");

    let response = backend.send(&req).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.headers["x-backend"], "test");
    assert_eq!(response.body, Bytes::from_static(b"localhost /payments 7"));
}

#[tokio::test]
async fn connections_are_reused_across_requests() {
    let dir = tempdir().unwrap();
    let socket = dir.path().join("api1.sock");
    start_uds_server(&socket, Duration::ZERO, Arc::new(ConcurrencyTracker::new()));

    let backend = UdsBackend::new(&socket, settings(1));
    for _ in 0..5 {
        let req = upstream_request(Method::GET, "/summary", "");
        assert!(backend.send(&req).await.is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn limits_inflight_per_backend() {
    let dir = tempdir().unwrap();
    let socket = dir.path().join("api1.sock");
    let tracker = Arc::new(ConcurrencyTracker::new());
    start_uds_server(&socket, Duration::from_millis(50), tracker.clone());

    let backend = Arc::new(UdsBackend::new(
        &socket,
        BackendSettings {
            max_conns: 1,
            max_conn_wait: Duration::from_secs(2),
            ..BackendSettings::default()
        },
    ));

    let b1 = backend.clone();
    let r1 = tokio::spawn(async move { b1.send(&upstream_request(Method::GET, "/", "")).await });
    let b2 = backend.clone();
    let r2 = tokio::spawn(async move { b2.send(&upstream_request(Method::GET, "/", "")).await });

    let (r1, r2) = tokio::join!(r1, r2);
    assert!(r1.unwrap().is_ok());
    assert!(r2.unwrap().is_ok());
    assert_eq!(tracker.max.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saturated_backend_gives_up_after_max_conn_wait() {
    let dir = tempdir().unwrap();
    let socket = dir.path().join("api1.sock");
    start_uds_server(
        &socket,
        Duration::from_millis(500),
        Arc::new(ConcurrencyTracker::new()),
    );

    let backend = Arc::new(UdsBackend::new(
        &socket,
        BackendSettings {
            max_conns: 1,
            max_conn_wait: Duration::from_millis(20),
            ..BackendSettings::default()
        },
    ));

    let slow = backend.clone();
    let first =
        tokio::spawn(async move { slow.send(&upstream_request(Method::GET, "/", "")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = backend
        .send(&upstream_request(Method::GET, "/", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::Saturated(_)));
    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn missing_socket_is_a_connect_error() {
    let dir = tempdir().unwrap();
    let backend = UdsBackend::new(dir.path().join("absent.sock"), settings(1));

    let err = backend
        .send(&upstream_request(Method::GET, "/", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::Connect(_)), "got {err}");
}

#[tokio::test]
async fn slow_backend_hits_timeout() {
    let dir = tempdir().unwrap();
    let socket = dir.path().join("api1.sock");
    start_uds_server(
        &socket,
        Duration::from_millis(500),
        Arc::new(ConcurrencyTracker::new()),
    );

    let backend = UdsBackend::new(
        &socket,
        BackendSettings {
            write_timeout: Duration::from_millis(50),
            ..BackendSettings::default()
        },
    );

    let err = backend
        .send(&upstream_request(Method::GET, "/", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::WriteTimeout(_)));
}
