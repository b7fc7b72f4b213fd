use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode, body::Body};
use log::{debug, error, info, warn};
use tokio::time::timeout;

use sluice_bridge::{UpstreamRequest, UpstreamResponse, simple_response};
use sluice_lb::{Dispatcher, Forward};

/// Serves one inbound request through `dispatcher`.
///
/// Never fails: dispatch errors become `502 Backend error`, unreadable
/// bodies `400`, slow bodies `408`.
pub async fn handle<B, T>(
    dispatcher: &Dispatcher<B>,
    req: Request<T>,
    read_timeout: Duration,
) -> Response<Full<Bytes>>
where
    B: Forward<Request = UpstreamRequest, Response = UpstreamResponse>,
    T: Body,
    T::Error: std::fmt::Display,
{
    let start = Instant::now();
    let (parts, body) = req.into_parts();

    let body = match timeout(read_timeout, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(err)) => {
            warn!("Failed to read request body: {}", err);
            return simple_response(StatusCode::BAD_REQUEST, b"invalid request\n");
        }
        Err(_) => {
            warn!("Request body not received within {:?}", read_timeout);
            return simple_response(StatusCode::REQUEST_TIMEOUT, b"request timeout\n");
        }
    };

    let req = UpstreamRequest::new(parts, body);

    match dispatcher.dispatch(&req).await {
        Ok(dispatched) => {
            let backend = dispatcher.pool()[dispatched.backend].label();
            if dispatched.fallback {
                info!(
                    "{} {} served by fallback {}",
                    req.method(),
                    req.path(),
                    backend
                );
            }
            debug!(
                "Upstream {} status {} latency_ms {}",
                backend,
                dispatched.response.status,
                start.elapsed().as_millis()
            );
            dispatched.response.into_response()
        }
        Err(err) => {
            error!("{} {} failed: {}", req.method(), req.path(), err);
            simple_response(StatusCode::BAD_GATEWAY, b"Backend error\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fmt,
        sync::{
            Mutex, Once,
            atomic::{AtomicUsize, Ordering},
        },
        thread::{self, ThreadId},
    };

    use log::{Level, LevelFilter, Log, Metadata, Record};

    use http::{HeaderMap, Method};
    use sluice_lb::{BackendPool, FailoverPolicy, RotationPolicy};

    use super::*;

    #[derive(Debug)]
    struct Down;

    impl fmt::Display for Down {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection refused")
        }
    }

    impl std::error::Error for Down {}

    struct EchoBackend {
        name: &'static str,
        up: bool,
        calls: AtomicUsize,
    }

    impl EchoBackend {
        fn new(name: &'static str, up: bool) -> Self {
            Self {
                name,
                up,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Forward for EchoBackend {
        type Request = UpstreamRequest;
        type Response = UpstreamResponse;
        type Error = Down;

        fn label(&self) -> &str {
            self.name
        }

        async fn forward(&self, req: &UpstreamRequest) -> Result<UpstreamResponse, Down> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.up {
                return Err(Down);
            }
            let body = format!("{} {} {}", self.name, req.path(), req.body().len());
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from(body),
            })
        }
    }

    fn dispatcher(backends: Vec<EchoBackend>) -> Dispatcher<EchoBackend> {
        Dispatcher::new(
            BackendPool::new(backends),
            RotationPolicy::Modulo,
            FailoverPolicy::Pair,
        )
    }

    fn request(body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("/payments")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn passes_body_through_to_backend() {
        let lb = dispatcher(vec![EchoBackend::new("api1", true), EchoBackend::new("api2", true)]);

        let response = handle(&lb, request("hello"), Duration::from_secs(1)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, Bytes::from_static(b"api1 /payments 5"));
    }

    #[tokio::test]
    async fn fallback_response_reaches_caller() {
        let lb = dispatcher(vec![EchoBackend::new("api1", false), EchoBackend::new("api2", true)]);

        let response = handle(&lb, request(""), Duration::from_secs(1)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, Bytes::from_static(b"api2 /payments 0"));
    }

    #[tokio::test]
    async fn double_failure_is_one_bad_gateway() {
        let lb = dispatcher(vec![EchoBackend::new("api1", false), EchoBackend::new("api2", false)]);

        let response = handle(&lb, request(""), Duration::from_secs(1)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_of(response).await, Bytes::from_static(b"Backend error\n"));
        assert_eq!(lb.pool()[0].calls.load(Ordering::SeqCst), 1);
        assert_eq!(lb.pool()[1].calls.load(Ordering::SeqCst), 1);
    }

    static RECORDS: Mutex<Vec<(ThreadId, Level)>> = Mutex::new(Vec::new());

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS
                .lock()
                .unwrap()
                .push((thread::current().id(), record.level()));
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INSTALL: Once = Once::new();

    fn errors_logged_here() -> usize {
        INSTALL.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(LevelFilter::Trace);
        });
        let me = thread::current().id();
        RECORDS
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, level)| *id == me && *level == Level::Error)
            .count()
    }

    #[tokio::test]
    async fn failed_request_logs_one_error() {
        let before = errors_logged_here();
        let lb = dispatcher(vec![EchoBackend::new("api1", false), EchoBackend::new("api2", false)]);

        let response = handle(&lb, request(""), Duration::from_secs(1)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(errors_logged_here() - before, 1);

        let single = dispatcher(vec![EchoBackend::new("api1", false)]);
        let before = errors_logged_here();
        let response = handle(&single, request(""), Duration::from_secs(1)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(errors_logged_here() - before, 1);
    }

    #[tokio::test]
    async fn empty_pool_is_bad_gateway() {
        let lb = dispatcher(Vec::new());

        let response = handle(&lb, request(""), Duration::from_secs(1)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
