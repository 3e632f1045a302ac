//! Recognising the relay's own chatter.
//!
//! Everything the relay (or a worker reporting on its behalf) posts to the
//! dialog must be recognised here, otherwise it comes back on the next poll
//! as a fresh instruction.

use std::fmt;

/// Marker prefixed to every message the relay sends.
pub const BOT_PREFIX: &str = "[bot]";

/// Status phrases that may reach the dialog without the marker.
pub const STATUS_PHRASES: &[&str] = &["Starting:", "Done ✓", "Yes —", "New approach:", "Update:"];

/// Whether `text` was produced by the relay or its worker.
#[must_use]
pub fn is_self_originated(text: &str) -> bool {
    text.starts_with(BOT_PREFIX) || STATUS_PHRASES.iter().any(|p| text.starts_with(p))
}

/// Prefix `line` with the marker unless it already carries it.
#[must_use]
pub fn with_marker(line: &str) -> String {
    if line.starts_with(BOT_PREFIX) {
        line.to_string()
    } else {
        format!("{BOT_PREFIX} {line}")
    }
}

/// Status messages posted around a worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Starting,
    Done,
    Failed { exit_code: i32 },
    Error(String),
}

impl StatusReport {
    /// Status for a finished worker.
    #[must_use]
    pub const fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            Self::Done
        } else {
            Self::Failed { exit_code }
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "{BOT_PREFIX} Starting..."),
            Self::Done => write!(f, "{BOT_PREFIX} Done ✓"),
            Self::Failed { exit_code } => write!(f, "{BOT_PREFIX} Error (exit {exit_code})"),
            Self::Error(message) => write!(f, "{BOT_PREFIX} Error: {message}"),
        }
    }
}
