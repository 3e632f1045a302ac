//! Chat context for worker runs.

use std::{convert::Infallible, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Identifier of a conversation.
///
/// Numeric ids (groups are negative) are kept as integers so clients can
/// address the peer directly; anything else is treated as a username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DialogId {
    Numeric(i64),
    Username(String),
}

impl FromStr for DialogId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse() {
                return Ok(Self::Numeric(id));
            }
        }
        Ok(Self::Username(trimmed.to_string()))
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Username(name) => f.write_str(name),
        }
    }
}

/// Identifies which conversation and working environment a worker run targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContext {
    /// Conversation the relay reads from and reports to.
    pub dialog_id: DialogId,

    /// Working directory for the worker.
    pub workspace: PathBuf,

    /// Worker-side chat id, created on first run and reused afterwards.
    #[serde(default)]
    pub persisted_chat_id: Option<String>,
}

impl ChatContext {
    /// Create a context without a persisted chat.
    #[must_use]
    pub const fn new(dialog_id: DialogId, workspace: PathBuf) -> Self {
        Self {
            dialog_id,
            workspace,
            persisted_chat_id: None,
        }
    }

    /// Attach a persisted chat id.
    #[must_use]
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.persisted_chat_id = Some(chat_id.into());
        self
    }

    /// Resolve a file name relative to the workspace.
    #[must_use]
    pub fn workspace_file(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }
}
