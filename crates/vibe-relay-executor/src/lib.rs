//! Agent worker executor.
//!
//! Provides:
//! - Worker profiles (argument contract per agent CLI)
//! - Command building and PATH resolution
//! - `AgentRunner` - spawn one worker run and stream its output
//! - Chat id persistence and the fallback send-queue file

pub mod chat;
pub mod command;
pub mod output;
pub mod path;
pub mod profile;
pub mod runner;
pub mod side_channel;

pub use chat::ChatStore;
pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use output::ConsoleWriter;
pub use profile::{Invocation, WorkerProfile};
pub use runner::AgentRunner;
pub use side_channel::SendQueue;
