//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for the Bookgen Engine.
//! Methods are versioned (`book.submit.v1`); progress is also pushed over
//! a WebSocket subscription.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
