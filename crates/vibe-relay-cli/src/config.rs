//! Command line and environment configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use vibe_relay_core::DialogId;
use vibe_relay_executor::WorkerProfile;
use vibe_relay_session::RetryPolicy;

/// Relay instructions posted to a chat dialog to a local agent CLI.
#[derive(Parser, Debug)]
#[command(name = "vibe-relay", version, about, long_about = None)]
pub struct Cli {
    /// Dialog to relay (omit to pick interactively)
    #[arg(short, long, env = "VIBE_DIALOG", global = true, allow_hyphen_values = true)]
    pub dialog: Option<DialogId>,

    /// Workspace the agent runs in
    #[arg(short, long, env = "VIBE_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Poll interval in seconds
    #[arg(short, long, env = "VIBE_POLL_INTERVAL", default_value_t = 1)]
    pub interval: u64,

    /// Chat id file, relative to the workspace
    #[arg(long, env = "VIBE_CHAT_FILE", default_value = ".vibe-agent-chat")]
    pub chat_file: String,

    /// Fallback send-queue file, relative to the workspace
    #[arg(long, env = "VIBE_SEND_QUEUE_FILE", default_value = ".vibe-send-queue")]
    pub queue: String,

    /// Agent CLI to run (cursor or gemini)
    #[arg(long, env = "VIBE_WORKER", default_value = "gemini")]
    pub worker: WorkerProfile,

    /// Model for the cursor worker
    #[arg(long, env = "VIBE_MODEL", default_value = "composer-1.5")]
    pub model: String,

    /// Resume the agent's last session (skip prompt)
    #[arg(long, conflicts_with = "no_resume")]
    pub resume: bool,

    /// Start a fresh agent session (skip prompt)
    #[arg(long)]
    pub no_resume: bool,

    /// Session bridge URL
    #[arg(
        long,
        env = "VIBE_SESSION_URL",
        default_value = "http://127.0.0.1:8765",
        global = true
    )]
    pub session_url: String,

    /// Attempts per session operation while the session is locked
    #[arg(long, default_value_t = 10, global = true)]
    pub lock_retries: u32,

    /// Seconds between locked-session retries
    #[arg(long, default_value_t = 3, global = true)]
    pub lock_delay: u64,

    /// Recent messages fetched per poll
    #[arg(long, default_value_t = 20)]
    pub window: usize,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Poll the dialog and relay instructions (default)
    Run,
    /// Send one message to the dialog
    Send {
        /// Message text
        message: String,
    },
    /// List dialogs with their ids
    Dialogs,
    /// Serve the session API with reconnect-on-drop
    Proxy {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8765")]
        bind: SocketAddr,

        /// Upstream session bridge URL
        #[arg(long, required_unless_present = "memory", conflicts_with = "memory")]
        upstream: Option<String>,

        /// Serve an in-memory session (local development)
        #[arg(long)]
        memory: bool,
    },
}

impl Cli {
    /// Worker profile with the configured model applied.
    #[must_use]
    pub fn profile(&self) -> WorkerProfile {
        match &self.worker {
            WorkerProfile::Cursor { .. } => WorkerProfile::Cursor {
                model: self.model.clone(),
            },
            other => other.clone(),
        }
    }

    /// Explicit resume choice, if any.
    #[must_use]
    pub const fn resume_choice(&self) -> Option<bool> {
        if self.resume {
            Some(true)
        } else if self.no_resume {
            Some(false)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.lock_retries, Duration::from_secs(self.lock_delay))
    }

    /// Wait between a worker exit and reading the side channel.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.lock_delay.saturating_mul(2))
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(if self.interval == 0 { 1 } else { self.interval })
    }

    /// Absolute workspace directory.
    ///
    /// # Errors
    /// Returns error if the directory does not exist.
    pub fn workspace(&self) -> std::io::Result<PathBuf> {
        match &self.workspace {
            Some(path) => path.canonicalize(),
            None => std::env::current_dir(),
        }
    }
}
