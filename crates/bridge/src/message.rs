use bytes::Bytes;
use http::{
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, header,
    request, response, uri::PathAndQuery,
};
use http_body_util::Full;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid upstream host: {0}")]
    InvalidHost(String),

    #[error("invalid uri")]
    InvalidUri,

    #[error("request build error: {0}")]
    Build(#[from] http::Error),
}

fn is_hop_header(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "transfer-encoding"
            | "upgrade"
            | "te"
            | "trailer"
    )
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    let hop: Vec<_> = headers
        .keys()
        .filter(|name| is_hop_header(name.as_str()))
        .cloned()
        .collect();
    for name in hop {
        headers.remove(&name);
    }
}

/// Fully buffered inbound request that can be sent more than once.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    method: Method,
    path: PathAndQuery,
    headers: HeaderMap,
    body: Bytes,
}

impl UpstreamRequest {
    pub fn new(parts: request::Parts, body: Bytes) -> Self {
        let path = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        let mut headers = parts.headers;
        strip_hop_headers(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        Self {
            method: parts.method,
            path,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds a request addressed to `host`, whatever host the caller used.
    ///
    /// Scheme is always `http`; `Host` is overwritten with `host`.
    pub fn to_request(&self, host: &str) -> Result<Request<Full<Bytes>>, BridgeError> {
        let host_value =
            HeaderValue::from_str(host).map_err(|_| BridgeError::InvalidHost(host.to_string()))?;

        let uri = Uri::builder()
            .scheme("http")
            .authority(host)
            .path_and_query(self.path.as_str())
            .build()
            .map_err(|_| BridgeError::InvalidUri)?;

        let mut builder = Request::builder().method(self.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
            headers.insert(header::HOST, host_value);
            if !self.body.is_empty() {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
            }
        }

        Ok(builder.body(Full::new(self.body.clone()))?)
    }
}

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(parts: response::Parts, body: Bytes) -> Self {
        let mut headers = parts.headers;
        strip_hop_headers(&mut headers);

        Self {
            status: parts.status,
            headers,
            body,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

pub fn simple_response(status: StatusCode, body: &'static [u8]) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
