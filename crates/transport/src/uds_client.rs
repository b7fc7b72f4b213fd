use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::Client,
    rt::{TokioExecutor, TokioTimer},
};
use log::debug;
use tokio::{sync::Semaphore, time::timeout};

use sluice_bridge::{BridgeError, UpstreamRequest, UpstreamResponse};
use sluice_lb::Forward;

use crate::unix_connector::UnixConnector;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid request: {0}")]
    Build(#[from] BridgeError),

    #[error("no free connection within {0:?}")]
    Saturated(Duration),

    #[error("connect failed: {0:?}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    #[error("no response head within {0:?}")]
    WriteTimeout(Duration),

    #[error("no response body within {0:?}")]
    ReadTimeout(Duration),

    #[error("upstream error: {0:?}")]
    Upstream(#[source] hyper_util::client::legacy::Error),

    #[error("response body error: {0}")]
    Body(#[source] hyper::Error),
}

/// Per-backend client knobs.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Host written into every forwarded request.
    pub host: String,
    pub max_conns: usize,
    pub max_conn_wait: Duration,
    pub max_idle_conn: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            max_conns: 100,
            max_conn_wait: Duration::from_millis(200),
            max_idle_conn: Duration::from_secs(15),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// One upstream worker behind a Unix socket.
///
/// Keep-alive connections are pooled by hyper; at most `max_conns` requests
/// are in flight at once and the rest wait up to `max_conn_wait` for a slot.
pub struct UdsBackend {
    socket: PathBuf,
    label: String,
    settings: BackendSettings,
    client: Client<UnixConnector, Full<Bytes>>,
    inflight: Arc<Semaphore>,
}

impl UdsBackend {
    pub fn new(socket: impl Into<PathBuf>, settings: BackendSettings) -> Self {
        let socket = socket.into();
        let max_conns = settings.max_conns.max(1);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(settings.max_idle_conn)
            .pool_max_idle_per_host(max_conns)
            .pool_timer(TokioTimer::new())
            .build(UnixConnector::new(socket.clone()));

        Self {
            label: socket.display().to_string(),
            socket,
            settings,
            client,
            inflight: Arc::new(Semaphore::new(max_conns)),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    pub async fn send(&self, req: &UpstreamRequest) -> Result<UpstreamResponse, ForwardError> {
        let request = req.to_request(&self.settings.host)?;

        let wait = self.settings.max_conn_wait;
        let _permit = match timeout(wait, self.inflight.acquire()).await {
            Ok(Ok(permit)) => permit,
            // a closed semaphore counts as no capacity
            Ok(Err(_)) | Err(_) => return Err(ForwardError::Saturated(wait)),
        };

        let write_timeout = self.settings.write_timeout;
        let response = match timeout(write_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if err.is_connect() => return Err(ForwardError::Connect(err)),
            Ok(Err(err)) => return Err(ForwardError::Upstream(err)),
            Err(_) => return Err(ForwardError::WriteTimeout(write_timeout)),
        };

        let (parts, body) = response.into_parts();

        let read_timeout = self.settings.read_timeout;
        let body = match timeout(read_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) => return Err(ForwardError::Body(err)),
            Err(_) => return Err(ForwardError::ReadTimeout(read_timeout)),
        };

        debug!(
            "{} {} -> {} {} ({} bytes)",
            req.method(),
            req.path(),
            self.label,
            parts.status,
            body.len()
        );

        Ok(UpstreamResponse::new(parts, body))
    }
}

impl Forward for UdsBackend {
    type Request = UpstreamRequest;
    type Response = UpstreamResponse;
    type Error = ForwardError;

    fn label(&self) -> &str {
        &self.label
    }

    async fn forward(&self, req: &UpstreamRequest) -> Result<UpstreamResponse, ForwardError> {
        self.send(req).await
    }
}
