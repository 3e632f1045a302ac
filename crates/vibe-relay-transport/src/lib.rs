//! HTTP transport for the chat session.
//!
//! Provides:
//! - Wire protocol (JSON, typed error bodies)
//! - `HttpSessionClient` - session client for a bridge or relay proxy
//! - Axum server exposing any session client over the same API

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{HttpSessionClient, TransportError};
pub use protocol::{ErrorBody, StatusResponse};
pub use server::{ApiError, router, serve};
