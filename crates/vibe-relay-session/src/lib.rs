//! Session access and dispatch for the relay.
//!
//! Provides:
//! - `SessionGate` - Serialised, retrying access to the shared chat session
//! - `ReconnectProxy` - Reconnect-on-drop wrapper for long-lived servers
//! - `Poller` - Fetch, dedup and enqueue new instructions
//! - `Dispatcher` - Single-flight batching of instructions into worker runs
//! - `MemorySession` - In-process session client (feature: memory)

pub mod dispatcher;
pub mod gate;
pub mod poller;
pub mod reconnect;

#[cfg(feature = "memory")]
pub mod memory;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig, RunReport};
pub use gate::{RetryPolicy, SessionGate};
pub use poller::{InstructionSink, PollOutcome, Poller};
pub use reconnect::ReconnectProxy;

#[cfg(feature = "memory")]
pub use memory::MemorySession;
