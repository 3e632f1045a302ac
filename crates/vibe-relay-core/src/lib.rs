//! Core types for relaying chat instructions to a local agent worker.
//!
//! This crate provides the fundamental building blocks:
//! - `Item` / `Cursor` - Fetched messages and dedup state
//! - `Batch` - Merging queued instructions into one worker prompt
//! - `filter` - Recognising the relay's own status chatter
//! - `ChatContext` - Which conversation and workspace a run targets
//! - `SessionClient` and `Worker` traits

pub mod batch;
pub mod context;
pub mod cursor;
pub mod filter;
pub mod traits;

pub use batch::Batch;
pub use context::{ChatContext, DialogId};
pub use cursor::{Cursor, Observation};
pub use filter::{BOT_PREFIX, StatusReport, is_self_originated};
pub use traits::{
    DialogInfo, ExecutorError, Item, SessionClient, SessionError, SessionErrorKind, Worker,
};
