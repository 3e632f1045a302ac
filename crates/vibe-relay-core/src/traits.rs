//! Core traits for the chat session and the agent worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DialogId;

/// A message fetched from the chat source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Source message id, monotonic within a dialog.
    pub id: i64,
    /// Raw message text.
    pub text: String,
}

impl Item {
    /// Create a new item.
    #[must_use]
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// A conversation the session can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogInfo {
    /// Peer id, as accepted by `DialogId::from_str`.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Classification of a session failure.
///
/// Retry policy switches on this, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// The session resource is held by another client of the same store.
    Contention,
    /// The transport dropped or could not be established.
    Connection,
    /// The session is not logged in.
    Unauthorized,
    /// Anything else.
    Other,
}

/// Session error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SessionError {
    /// Failure class.
    pub kind: SessionErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl SessionError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Session resource is locked by another holder.
    #[must_use]
    pub fn contention(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Contention, message)
    }

    /// Transport level failure.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Connection, message)
    }

    /// Not logged in.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            SessionErrorKind::Unauthorized,
            "Not logged in. Re-authenticate the session and restart the relay",
        )
    }

    /// Any other failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Other, message)
    }

    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self.kind, SessionErrorKind::Contention)
    }

    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self.kind, SessionErrorKind::Connection)
    }
}

/// Client for the shared chat session.
///
/// Implementations own the underlying connection. Callers are expected to
/// hold a connection only for the duration of a single operation; see the
/// session gate in `vibe-relay-session`.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Open the connection.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Whether the session is logged in.
    async fn is_authorized(&self) -> Result<bool, SessionError>;

    /// Fetch up to `limit` of the most recent messages, newest first.
    async fn fetch_recent(&self, dialog: &DialogId, limit: usize)
    -> Result<Vec<Item>, SessionError>;

    /// Send a text message.
    async fn send_text(&self, dialog: &DialogId, text: &str) -> Result<(), SessionError>;

    /// List the dialogs visible to this session.
    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, SessionError>;
}

/// Executor error.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command build error: {0}")]
    CommandBuild(String),
    #[error("Chat creation failed: {0}")]
    ChatCreation(String),
}

/// Trait for the external agent worker.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the worker on one rendered instruction batch.
    ///
    /// Returns the process exit code. A nonzero code is a worker failure,
    /// not an error.
    async fn run(&self, instruction: &str) -> Result<i32, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_helpers() {
        assert!(SessionError::contention("database is locked").is_contention());
        assert!(SessionError::connection("reset").is_connection());
        assert!(!SessionError::unauthorized().is_contention());
        assert_eq!(SessionError::other("boom").to_string(), "boom");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&SessionErrorKind::Contention).unwrap();
        assert_eq!(json, "\"contention\"");

        let parsed: SessionErrorKind = serde_json::from_str("\"unauthorized\"").unwrap();
        assert_eq!(parsed, SessionErrorKind::Unauthorized);
    }

    struct Echo;

    #[async_trait]
    impl Worker for Echo {
        async fn run(&self, instruction: &str) -> Result<i32, ExecutorError> {
            i32::try_from(instruction.len())
                .map_err(|e| ExecutorError::CommandBuild(e.to_string()))
        }
    }

    #[test]
    fn test_worker_is_object_safe() {
        let worker: Box<dyn Worker> = Box::new(Echo);
        let code = tokio_test::block_on(worker.run("abc")).unwrap();
        assert_eq!(code, 3);
    }
}
