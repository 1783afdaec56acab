//! Minimal HTTP/1 JSON client used to talk to cluster peers, the
//! orchestrator, and the provider API.
//!
//! One connection per request; callers bound the call with a
//! [`Deadline`](crate::Deadline).

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ErrorKind, ProviderError, ProviderResult};

/// A decoded HTTP response.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl JsonResponse {
    /// Decode the body as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ProviderResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ProviderError::Internal(format!("malformed response body: {e}"))
        })
    }

    /// Turn a non-2xx response into the matching error kind.
    pub fn error_for_status(self) -> ProviderResult<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        let text = String::from_utf8_lossy(&self.body).trim().to_string();
        let message = if text.is_empty() {
            self.status.to_string()
        } else {
            text
        };
        Err(ProviderError::from_kind(kind_for_status(self.status), message))
    }
}

/// Error kind implied by an HTTP status code.
pub fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ErrorKind::InvalidArgument
        }
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => ErrorKind::Conflict,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ErrorKind::Forbidden,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => ErrorKind::Unavailable,
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => ErrorKind::Timeout,
        _ => ErrorKind::Internal,
    }
}

/// A request against `authority` (`host:port`).
#[derive(Debug, Clone)]
pub struct JsonRequest {
    method: Method,
    authority: String,
    path: String,
    bearer: Option<String>,
    body: Option<Vec<u8>>,
}

impl JsonRequest {
    pub fn new(method: Method, authority: &str, path: &str) -> Self {
        Self {
            method,
            authority: authority.to_string(),
            path: path.to_string(),
            bearer: None,
            body: None,
        }
    }

    pub fn get(authority: &str, path: &str) -> Self {
        Self::new(Method::GET, authority, path)
    }

    pub fn post(authority: &str, path: &str) -> Self {
        Self::new(Method::POST, authority, path)
    }

    /// Attach a bearer token.
    pub fn bearer(mut self, token: &str) -> Self {
        if !token.is_empty() {
            self.bearer = Some(token.to_string());
        }
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> ProviderResult<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| ProviderError::Internal(format!("encode request body: {e}")))?;
        self.body = Some(encoded);
        Ok(self)
    }

    /// Send the request and read the whole response.
    ///
    /// Connection failures map to `Unavailable`; HTTP-level status codes
    /// are left for the caller (see [`JsonResponse::error_for_status`]).
    pub async fn send(self) -> ProviderResult<JsonResponse> {
        let uri = format!("http://{}{}", self.authority, self.path);

        let stream = tokio::net::TcpStream::connect(self.authority.as_str())
            .await
            .map_err(|e| {
                debug!(error = %e, %uri, "connection failed");
                ProviderError::Unavailable(format!("connect {}: {e}", self.authority))
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("handshake {}: {e}", self.authority)))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = http::Request::builder()
            .method(self.method.clone())
            .uri(self.path.as_str())
            .header(http::header::HOST, self.authority.as_str())
            .header(http::header::USER_AGENT, "dbgrid/0.1")
            .header(http::header::ACCEPT, "application/json");
        if let Some(token) = &self.bearer {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if self.body.is_some() {
            builder = builder.header(http::header::CONTENT_TYPE, "application/json");
        }
        let body = Full::new(Bytes::from(self.body.unwrap_or_default()));
        let req = builder
            .body(body)
            .map_err(|e| ProviderError::InvalidArgument(format!("build request {uri}: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("request {uri}: {e}")))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("read body {uri}: {e}")))?
            .to_bytes();

        debug!(%uri, %status, bytes = body.len(), "http response");
        Ok(JsonResponse { status, body })
    }
}
