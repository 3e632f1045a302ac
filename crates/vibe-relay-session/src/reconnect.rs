//! Reconnect-on-drop wrapper for long-lived session holders.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use vibe_relay_core::{DialogId, DialogInfo, Item, SessionClient, SessionError};

/// Wraps a client so each call connects lazily and recovers from dropped
/// connections by reconnecting.
///
/// Only `Connection` errors trigger a reconnect; other errors are returned
/// as-is so contention still reaches the caller's own retry loop.
pub struct ReconnectProxy<C> {
    inner: Arc<C>,
    attempts: u32,
    delay: Duration,
    release_after_call: bool,
    lock: Mutex<()>,
}

impl<C: SessionClient> ReconnectProxy<C> {
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    #[must_use]
    pub fn from_arc(inner: Arc<C>) -> Self {
        Self {
            inner,
            attempts: 2,
            delay: Duration::from_secs(1),
            release_after_call: true,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.delay = delay;
        self
    }

    /// Keep the connection open between calls.
    #[must_use]
    pub const fn keep_connected(mut self) -> Self {
        self.release_after_call = false;
        self
    }

    #[must_use]
    pub const fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    async fn ensure_connected(&self) -> Result<(), SessionError> {
        if !self.inner.is_connected() {
            tracing::debug!("Connecting session");
            self.inner.connect().await?;
        }
        Ok(())
    }

    async fn call<T, F, Fut>(&self, op: F) -> Result<T, SessionError>
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, SessionError>> + Send,
        T: Send,
    {
        let _held = self.lock.lock().await;
        let mut attempt = 1;
        let result = loop {
            let outcome = match self.ensure_connected().await {
                Ok(()) => op(Arc::clone(&self.inner)).await,
                Err(e) => Err(e),
            };
            match outcome {
                Err(e) if e.is_connection() && attempt < self.attempts => {
                    tracing::warn!(attempt, "Session connection lost ({e}), reconnecting");
                    let _ = self.inner.disconnect().await;
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                other => break other,
            }
        };

        if self.release_after_call && self.inner.is_connected() {
            if let Err(e) = self.inner.disconnect().await {
                tracing::debug!("Failed to release session: {e}");
            }
        }
        result
    }
}

#[async_trait]
impl<C: SessionClient + 'static> SessionClient for ReconnectProxy<C> {
    async fn connect(&self) -> Result<(), SessionError> {
        // Connection is established on demand.
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let _held = self.lock.lock().await;
        if self.inner.is_connected() {
            self.inner.disconnect().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn is_authorized(&self) -> Result<bool, SessionError> {
        self.call(|c| async move { c.is_authorized().await }).await
    }

    async fn fetch_recent(
        &self,
        dialog: &DialogId,
        limit: usize,
    ) -> Result<Vec<Item>, SessionError> {
        self.call(|c| async move { c.fetch_recent(dialog, limit).await })
            .await
    }

    async fn send_text(&self, dialog: &DialogId, text: &str) -> Result<(), SessionError> {
        self.call(|c| async move { c.send_text(dialog, text).await })
            .await
    }

    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, SessionError> {
        self.call(|c| async move { c.list_dialogs().await }).await
    }
}
