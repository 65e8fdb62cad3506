//! Interactive SSH session relay for browser terminals.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Connection config, session record and wire messages
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Error taxonomy and classification of SSH failures
//! - `transport`: The remote-shell capability traits
//! - `ssh`, `session`, `auth`: russh implementation of the capability
//! - `connection`: One live remote shell and its read loop
//! - `registry`: Concurrent map of client identity to session
//! - `reaper`: Periodic disconnection of idle sessions
//! - `gateway`: WebSocket terminal endpoint and REST status routes
//! - `ops`: Read-only MCP tools

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod ops;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod ssh;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;
pub mod types;

pub use connection::{ConnectionEvent, RemoteShellConnection};
pub use error::{ErrorKind, RelayError};
pub use reaper::InactivityReaper;
pub use registry::SessionRegistry;
pub use ssh::RusshTransport;
