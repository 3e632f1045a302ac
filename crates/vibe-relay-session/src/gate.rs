//! Serialised access to the shared chat session.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use vibe_relay_core::{DialogId, DialogInfo, Item, SessionClient, SessionError};

/// Bounded retry for contention errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(3))
    }
}

/// Gate that holds the session for exactly one operation at a time.
///
/// Every call runs `connect -> authorise -> op -> disconnect` under a
/// process-wide lock, so two callers never interleave their sequences.
/// Contention errors are retried per [`RetryPolicy`] without releasing the
/// lock, so callers complete in the order they acquired it. Everything else
/// propagates on the first failure.
pub struct SessionGate<C> {
    client: Arc<C>,
    lock: Mutex<()>,
    policy: RetryPolicy,
}

impl<C> SessionGate<C>
where
    C: SessionClient + 'static,
{
    #[must_use]
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self::from_arc(Arc::new(client), policy)
    }

    #[must_use]
    pub fn from_arc(client: Arc<C>, policy: RetryPolicy) -> Self {
        Self {
            client,
            lock: Mutex::new(()),
            policy,
        }
    }

    #[must_use]
    pub const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Run `op` while holding the session.
    ///
    /// # Errors
    /// Returns the last contention error once attempts are exhausted, or the
    /// first non-contention error unchanged.
    pub async fn with_session<T, F, Fut>(&self, op: F) -> Result<T, SessionError>
    where
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let _held = self.lock.lock().await;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(&op).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_contention() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        "Session busy ({e}), retrying in {:?}",
                        self.policy.delay
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T, F, Fut>(&self, op: &F) -> Result<T, SessionError>
    where
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let result = async {
            self.client.connect().await?;
            if !self.client.is_authorized().await? {
                return Err(SessionError::unauthorized());
            }
            let value = op(Arc::clone(&self.client)).await?;
            self.client.disconnect().await?;
            Ok(value)
        }
        .await;

        if result.is_err() && self.client.is_connected() {
            if let Err(e) = self.client.disconnect().await {
                tracing::warn!("Failed to release session after error: {e}");
            }
        }
        result
    }

    /// Most recent `limit` items of `dialog`, newest first.
    ///
    /// # Errors
    /// See [`Self::with_session`].
    pub async fn fetch_recent(
        &self,
        dialog: &DialogId,
        limit: usize,
    ) -> Result<Vec<Item>, SessionError> {
        self.with_session(|client| async move { client.fetch_recent(dialog, limit).await })
            .await
    }

    /// # Errors
    /// See [`Self::with_session`].
    pub async fn send_text(&self, dialog: &DialogId, text: &str) -> Result<(), SessionError> {
        self.with_session(|client| async move { client.send_text(dialog, text).await })
            .await
    }

    /// # Errors
    /// See [`Self::with_session`].
    pub async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, SessionError> {
        self.with_session(|client| async move { client.list_dialogs().await })
            .await
    }

    /// Connect once and report whether the session is logged in.
    ///
    /// # Errors
    /// Returns `Unauthorized` when it is not, or any session failure.
    pub async fn check_authorized(&self) -> Result<(), SessionError> {
        self.with_session(|_| async { Ok(()) }).await
    }
}
