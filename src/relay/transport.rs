//! Capability seams between the relay core and the SSH library.
//!
//! The core only needs three things from SSH: establish an authenticated
//! connection, open an interactive PTY stream on it, and read/write/close
//! that stream. [`crate::relay::ssh::RusshTransport`] provides them over
//! russh; tests substitute an in-memory transport.

use async_trait::async_trait;

use super::error::RelayError;
use super::types::ConnectionConfig;

/// Establishes authenticated SSH connections.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// Connect and authenticate using the credentials in `config`.
    ///
    /// The caller applies the connect timeout; implementations should not
    /// wrap their own.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn ShellHandle>, RelayError>;
}

/// An authenticated connection able to open a shell.
#[async_trait]
pub trait ShellHandle: Send + Sync {
    /// Request a PTY of the given size and start a shell on it.
    async fn open_interactive_stream(
        &self,
        terminal: &str,
        columns: u16,
        rows: u16,
    ) -> Result<ShellStream, RelayError>;

    /// Tear down the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), RelayError>;
}

/// The two halves of an interactive stream.
pub struct ShellStream {
    pub reader: Box<dyn StreamReader>,
    pub writer: Box<dyn StreamWriter>,
}

#[async_trait]
pub trait StreamReader: Send {
    /// Next chunk of output. `Ok(None)` means the remote side closed the stream.
    async fn read(&mut self) -> Result<Option<Vec<u8>>, RelayError>;
}

#[async_trait]
pub trait StreamWriter: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), RelayError>;

    /// Propagate a terminal resize. Returns `false` when unsupported.
    async fn resize(&self, _columns: u16, _rows: u16) -> Result<bool, RelayError> {
        Ok(false)
    }

    async fn close(&self) -> Result<(), RelayError>;
}
