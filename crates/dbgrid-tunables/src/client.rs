//! Wire client for the leader's peer API.
//!
//! Every store instance serves a small JSON API next to its client port:
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | `GET` | `/status` | → [`LeaderStatus`] |
//! | `GET` | `/tunables` | → [`Tunables`] |
//! | `POST` | `/tunables` | [`Tunables`] with `version = current + 1`; 409 when it does not follow |

use std::future::Future;
use std::pin::Pin;

use dbgrid_core::http::JsonRequest;
use dbgrid_core::{Endpoint, ProviderResult, Tunables};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Boxed future returned by [`LeaderClient`] calls.
pub type PeerFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

/// Self-reported state of a store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderStatus {
    /// Replication role, e.g. `primary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Whether the instance currently accepts writes.
    #[serde(default)]
    pub read_write: bool,
}

impl LeaderStatus {
    pub fn read_write() -> Self {
        Self {
            role: Some("primary".to_string()),
            read_write: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            role: None,
            read_write: false,
        }
    }
}

/// Status and tunables calls against one instance's peer API.
pub trait LeaderClient: Send + Sync {
    fn status<'a>(&'a self, peer: &'a Endpoint) -> PeerFuture<'a, LeaderStatus>;

    fn get_tunables<'a>(&'a self, peer: &'a Endpoint) -> PeerFuture<'a, Tunables>;

    /// Submit `tunables`. The peer rejects with `Conflict` unless
    /// `tunables.version` is exactly one past its current version.
    fn update_tunables<'a>(&'a self, peer: &'a Endpoint, tunables: &'a Tunables) -> PeerFuture<'a, ()>;
}

/// [`LeaderClient`] over HTTP/1 JSON.
#[derive(Debug, Clone, Default)]
pub struct HttpLeaderClient;

impl HttpLeaderClient {
    pub fn new() -> Self {
        Self
    }
}

impl LeaderClient for HttpLeaderClient {
    fn status<'a>(&'a self, peer: &'a Endpoint) -> PeerFuture<'a, LeaderStatus> {
        Box::pin(async move {
            let resp = JsonRequest::get(&peer.to_string(), "/status")
                .send()
                .await?
                .error_for_status()?;
            let status: LeaderStatus = resp.json()?;
            debug!(%peer, read_write = status.read_write, "leader status");
            Ok(status)
        })
    }

    fn get_tunables<'a>(&'a self, peer: &'a Endpoint) -> PeerFuture<'a, Tunables> {
        Box::pin(async move {
            JsonRequest::get(&peer.to_string(), "/tunables")
                .send()
                .await?
                .error_for_status()?
                .json()
        })
    }

    fn update_tunables<'a>(&'a self, peer: &'a Endpoint, tunables: &'a Tunables) -> PeerFuture<'a, ()> {
        Box::pin(async move {
            JsonRequest::post(&peer.to_string(), "/tunables")
                .json(tunables)?
                .send()
                .await?
                .error_for_status()?;
            debug!(%peer, version = tunables.version, "tunables submitted");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use dbgrid_core::ProviderError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response and return the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (Endpoint, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = sock.read(&mut buf).await.unwrap();
            let resp = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (Endpoint::new("127.0.0.1", port), handle)
    }

    #[tokio::test]
    async fn reads_status() {
        let (peer, server) = serve_once("200 OK", r#"{"role":"primary","read_write":true}"#).await;
        let status = HttpLeaderClient::new().status(&peer).await.unwrap();
        assert_eq!(status, LeaderStatus::read_write());
        assert!(server.await.unwrap().starts_with("GET /status"));
    }

    #[tokio::test]
    async fn reads_tunables() {
        let (peer, _server) = serve_once("200 OK", r#"{"data":{"max_conn":"100"},"version":4}"#).await;
        let t = HttpLeaderClient::new().get_tunables(&peer).await.unwrap();
        assert_eq!(t.version, 4);
        assert_eq!(t.data["max_conn"], "100");
    }

    #[tokio::test]
    async fn update_posts_json_body() {
        let (peer, server) = serve_once("200 OK", "{}").await;
        let mut t = Tunables::default();
        t.data.insert("k".into(), "v".into());
        t.version = 2;
        HttpLeaderClient::new().update_tunables(&peer, &t).await.unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /tunables"));
        assert!(raw.contains(r#""version":2"#));
    }

    #[tokio::test]
    async fn update_conflict_maps_to_conflict() {
        let (peer, _server) = serve_once("409 Conflict", "version mismatch").await;
        let t = Tunables::default();
        let err = HttpLeaderClient::new().update_tunables(&peer, &t).await.unwrap_err();
        assert_eq!(err, ProviderError::Conflict("version mismatch".to_string()));
    }

    #[test]
    fn status_defaults_to_read_only() {
        let status: LeaderStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status, LeaderStatus::read_only());
    }
}
