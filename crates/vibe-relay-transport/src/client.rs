//! HTTP client for the session bridge.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use vibe_relay_core::{DialogId, DialogInfo, Item, SessionClient, SessionError};

use crate::protocol::{
    ErrorBody, MessagesQuery, SendRequest, SendResponse, StatusResponse, kind_for_status,
};

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{}", .0.message)]
    Remote(ErrorBody),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("Invalid bridge URL {0}")]
    InvalidUrl(String),
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Remote(body) => body.into(),
            TransportError::Status(status) => {
                Self::new(kind_for_status(status), format!("Unexpected status {status}"))
            }
            TransportError::Http(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                Self::connection(e.to_string())
            }
            TransportError::Http(e) => Self::other(e.to_string()),
            e @ TransportError::InvalidUrl(_) => Self::other(e.to_string()),
        }
    }
}

/// Session client talking JSON to a bridge (or a relay proxy).
///
/// `connect` verifies the bridge is reachable; the bridge owns the real
/// session and its lifetime.
pub struct HttpSessionClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    connected: AtomicBool,
}

impl HttpSessionClient {
    /// # Errors
    /// Returns error if `base_url` is not an absolute http(s) URL, or the
    /// HTTP client cannot be built.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, TransportError> {
        let raw = base_url.as_ref();
        let base_url = reqwest::Url::parse(raw)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| TransportError::InvalidUrl(raw.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url,
            connected: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Endpoint URL below the base, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn messages_url(&self, dialog: &DialogId) -> Result<reqwest::Url, TransportError> {
        self.url(&["dialogs", &dialog.to_string(), "messages"])
    }

    async fn status(&self) -> Result<StatusResponse, TransportError> {
        decode(self.http.get(self.url(&["status"])?).send().await?).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    match response.json::<ErrorBody>().await {
        Ok(body) => Err(TransportError::Remote(body)),
        Err(_) => Err(TransportError::Status(status.as_u16())),
    }
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    async fn connect(&self) -> Result<(), SessionError> {
        self.status().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, SessionError> {
        Ok(self.status().await?.authorized)
    }

    async fn fetch_recent(
        &self,
        dialog: &DialogId,
        limit: usize,
    ) -> Result<Vec<Item>, SessionError> {
        let response = self
            .http
            .get(self.messages_url(dialog)?)
            .query(&MessagesQuery { limit })
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(decode(response).await?)
    }

    async fn send_text(&self, dialog: &DialogId, text: &str) -> Result<(), SessionError> {
        let response = self
            .http
            .post(self.messages_url(dialog)?)
            .json(&SendRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .map_err(TransportError::from)?;
        let sent: SendResponse = decode(response).await?;
        if sent.success {
            Ok(())
        } else {
            Err(SessionError::other("Bridge rejected the message"))
        }
    }

    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, SessionError> {
        let response = self
            .http
            .get(self.url(&["dialogs"])?)
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(decode(response).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vibe_relay_session::{MemorySession, ReconnectProxy, RetryPolicy, SessionGate};

    use super::*;
    use crate::server::router;

    /// Serve `session` behind a proxy on an ephemeral port.
    async fn spawn_bridge(session: MemorySession) -> (Arc<ReconnectProxy<MemorySession>>, String) {
        let proxy = Arc::new(ReconnectProxy::new(session));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&proxy));
        tokio::spawn(async move { axum::serve(listener, app).await });
        (proxy, format!("http://{addr}/"))
    }

    #[tokio::test]
    async fn test_round_trip_through_bridge() {
        let dialog = DialogId::Numeric(-100);
        let session = MemorySession::new().with_dialog(&dialog, "Vibe");
        session.post(&dialog, "first").unwrap();
        let (proxy, url) = spawn_bridge(session).await;

        let client = HttpSessionClient::new(&url).unwrap();
        assert_eq!(client.base_url(), url);
        let gate = SessionGate::new(client, RetryPolicy::default());

        gate.send_text(&dialog, "[bot] Starting...").await.unwrap();
        let items = gate.fetch_recent(&dialog, 20).await.unwrap();
        assert_eq!(
            items,
            vec![Item::new(2, "[bot] Starting..."), Item::new(1, "first")]
        );
        let dialogs = gate.list_dialogs().await.unwrap();
        assert_eq!(dialogs[0].name, "Vibe");
        assert!(!gate.client().is_connected());
        assert_eq!(
            proxy.inner().transcript(&dialog),
            vec!["first", "[bot] Starting..."]
        );
    }

    #[tokio::test]
    async fn test_username_is_a_single_path_segment() {
        let dialog = DialogId::Username("ops/deploy?x#1".into());
        let session = MemorySession::new().with_dialog(&dialog, "Ops");
        let (proxy, url) = spawn_bridge(session).await;

        let gate = SessionGate::new(HttpSessionClient::new(url).unwrap(), RetryPolicy::default());
        gate.send_text(&dialog, "ship it").await.unwrap();
        let items = gate.fetch_recent(&dialog, 20).await.unwrap();

        assert_eq!(items, vec![Item::new(1, "ship it")]);
        assert_eq!(proxy.inner().transcript(&dialog), vec!["ship it"]);
    }

    #[test]
    fn test_url_keeps_base_path() {
        let client = HttpSessionClient::new("http://bridge.local/api").unwrap();
        let url = client.messages_url(&DialogId::Username("a b".into())).unwrap();
        assert_eq!(url.as_str(), "http://bridge.local/api/dialogs/a%20b/messages");
        assert!(matches!(
            HttpSessionClient::new("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_error_kind_survives() {
        let session = MemorySession::new();
        session.fail_next(SessionError::contention("database is locked"));
        let (_proxy, url) = spawn_bridge(session).await;

        let client = HttpSessionClient::new(url).unwrap();
        let err = client.list_dialogs().await.unwrap_err();
        assert_eq!(err, SessionError::contention("database is locked"));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpSessionClient::new(format!("http://{addr}")).unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert!(!client.is_connected());
    }
}
