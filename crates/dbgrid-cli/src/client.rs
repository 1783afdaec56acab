//! Provider API client.

use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use dbgrid_core::http::{JsonRequest, JsonResponse, kind_for_status};
use dbgrid_core::{
    DeprovisionRequest, ErrorKind, ProviderError, ProviderResult, ProvisionReply, StatusReply,
    Tunables, UpdateTunablesRequest,
};

/// Response envelope written by the API.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    kind: Option<ErrorKind>,
}

/// Talks to one provider API at `addr` (`host:port`).
#[derive(Debug, Clone)]
pub struct ApiClient {
    addr: String,
}

impl ApiClient {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
        }
    }

    async fn call<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ProviderResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let mut req = JsonRequest::new(method, &self.addr, path);
        if let Some(body) = body {
            req = req.json(body)?;
        }
        unwrap_envelope(req.send().await?)
    }

    pub async fn provision(&self) -> ProviderResult<ProvisionReply> {
        let body = serde_json::json!({});
        self.call(Method::POST, "/provider/provision", Some(&body)).await
    }

    pub async fn deprovision(&self, id: &str) -> ProviderResult<()> {
        let body = DeprovisionRequest { id: id.to_string() };
        let _: serde_json::Value = self
            .call(Method::POST, "/provider/deprovision", Some(&body))
            .await?;
        Ok(())
    }

    pub async fn get_tunables(&self, provider: &str, resource: &str) -> ProviderResult<Tunables> {
        self.call::<_, ()>(Method::GET, &tunables_path(provider, resource), None)
            .await
    }

    /// Submit `req.data` on top of `req.version`, the version last read.
    pub async fn update_tunables(&self, req: &UpdateTunablesRequest) -> ProviderResult<Tunables> {
        self.call(Method::PUT, "/provider/tunables", Some(req)).await
    }

    /// The health reply, whether the API answered 200 or 503.
    pub async fn status(&self) -> ProviderResult<StatusReply> {
        let resp = JsonRequest::get(&self.addr, "/status").send().await?;
        let envelope: Envelope<StatusReply> = resp.json()?;
        match envelope.data {
            Some(reply) => Ok(reply),
            None => Err(envelope_error(resp.status, envelope.error, envelope.kind)),
        }
    }
}

fn unwrap_envelope<T: DeserializeOwned>(resp: JsonResponse) -> ProviderResult<T> {
    let envelope: Envelope<T> = match resp.json() {
        Ok(envelope) => envelope,
        // Not our envelope (proxy error page, axum rejection text).
        Err(_) => return resp.error_for_status().and_then(|r| r.json()),
    };
    if envelope.success && resp.status.is_success() {
        return envelope
            .data
            .ok_or_else(|| ProviderError::Internal("response carried no data".to_string()));
    }
    Err(envelope_error(resp.status, envelope.error, envelope.kind))
}

fn envelope_error(status: StatusCode, error: Option<String>, kind: Option<ErrorKind>) -> ProviderError {
    let kind = kind.unwrap_or_else(|| kind_for_status(status));
    ProviderError::from_kind(kind, error.unwrap_or_else(|| status.to_string()))
}

fn tunables_path(provider: &str, resource: &str) -> String {
    format!(
        "/provider/tunables?provider={}&resource={}",
        urlencoding::encode(provider),
        urlencoding::encode(resource)
    )
}
