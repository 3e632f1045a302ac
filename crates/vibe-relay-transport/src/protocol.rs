//! Wire protocol for the session bridge.

use serde::{Deserialize, Serialize};
use vibe_relay_core::{SessionError, SessionErrorKind};

/// Default number of messages returned when `limit` is omitted.
pub const DEFAULT_LIMIT: usize = 20;

/// `GET /status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub authorized: bool,
}

/// Query string of `GET /dialogs/{dialog}/messages`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// `POST /dialogs/{dialog}/messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl ErrorBody {
    /// HTTP status carrying this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        status_for(self.kind)
    }
}

/// HTTP status for each error kind.
#[must_use]
pub const fn status_for(kind: SessionErrorKind) -> u16 {
    match kind {
        SessionErrorKind::Contention => 423,
        SessionErrorKind::Connection => 503,
        SessionErrorKind::Unauthorized => 401,
        SessionErrorKind::Other => 500,
    }
}

/// Error kind for a status without a parsable body.
#[must_use]
pub const fn kind_for_status(status: u16) -> SessionErrorKind {
    match status {
        423 => SessionErrorKind::Contention,
        502..=504 => SessionErrorKind::Connection,
        401 => SessionErrorKind::Unauthorized,
        _ => SessionErrorKind::Other,
    }
}

impl From<SessionError> for ErrorBody {
    fn from(e: SessionError) -> Self {
        Self {
            kind: e.kind,
            message: e.message,
        }
    }
}

impl From<ErrorBody> for SessionError {
    fn from(body: ErrorBody) -> Self {
        Self::new(body.kind, body.message)
    }
}
