//! Error taxonomy for the relay and classification of SSH library failures.
//!
//! Every fallible relay operation returns [`RelayError`]. Its [`ErrorKind`] is the
//! stable, serializable classification the gateway forwards to the browser as
//! `errorType`.
//!
//! # Classification Strategy
//!
//! The SSH library reports handshake and authentication failures as free-form text.
//! [`classify_connect_error`] maps that text onto the taxonomy:
//!
//! 1. **Authentication Failures**: credential or permission problems. Checked first,
//!    so a message mentioning both "timeout" and "permission denied" is `AuthFailed`.
//!
//! 2. **Timeouts**: the remote host did not answer in time. Reported as
//!    `ConnectTimeout` carrying the configured timeout.
//!
//! 3. **Everything else**: connection refused, DNS failure, protocol mismatch and
//!    friends become `ConnectFailed`.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ssh_relay::relay::error::{classify_connect_error, ErrorKind};
//!
//! let timeout = Duration::from_secs(20);
//! assert_eq!(classify_connect_error("Permission denied", timeout).kind(), ErrorKind::AuthFailed);
//! assert_eq!(classify_connect_error("Connection timed out", timeout).kind(), ErrorKind::ConnectTimeout);
//! assert_eq!(classify_connect_error("Connection refused", timeout).kind(), ErrorKind::ConnectFailed);
//! ```

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Authentication error patterns that indicate rejected credentials.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "key authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
    "authentication rejected",
];

/// Patterns that indicate the remote side did not answer in time.
const TIMEOUT_ERRORS: &[&str] = &["timed out", "timeout", "deadline has elapsed"];

/// Serializable classification of a [`RelayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigInvalid,
    AuthFailed,
    ConnectTimeout,
    ConnectFailed,
    StreamUnavailable,
    SessionNotFound,
    SessionExists,
    NotConnected,
    IoError,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::ConnectTimeout => "connect_timeout",
            ErrorKind::ConnectFailed => "connect_failed",
            ErrorKind::StreamUnavailable => "stream_unavailable",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::SessionExists => "session_exists",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::IoError => "io_error",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors produced by the session relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid connection config: {0}")]
    ConfigInvalid(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    #[error("Shell stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("Session not found for client {0}")]
    SessionNotFound(String),

    #[error("Client {0} already has an active session")]
    SessionExists(String),

    #[error("Session for client {0} is not connected")]
    NotConnected(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection attempt cancelled")]
    Cancelled,
}

impl RelayError {
    /// Classification forwarded to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            RelayError::AuthFailed(_) => ErrorKind::AuthFailed,
            RelayError::ConnectTimeout(_) => ErrorKind::ConnectTimeout,
            RelayError::ConnectFailed(_) => ErrorKind::ConnectFailed,
            RelayError::StreamUnavailable(_) => ErrorKind::StreamUnavailable,
            RelayError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            RelayError::SessionExists(_) => ErrorKind::SessionExists,
            RelayError::NotConnected(_) => ErrorKind::NotConnected,
            RelayError::Io(_) => ErrorKind::IoError,
            RelayError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Classify an SSH connect/handshake failure message.
///
/// Authentication patterns take precedence over timeout patterns. Anything that
/// matches neither is reported as [`RelayError::ConnectFailed`] carrying the
/// original message.
pub(crate) fn classify_connect_error(message: &str, timeout: Duration) -> RelayError {
    let lower = message.to_lowercase();

    if AUTH_ERRORS.iter().any(|pattern| lower.contains(pattern)) {
        return RelayError::AuthFailed(message.to_string());
    }

    if TIMEOUT_ERRORS.iter().any(|pattern| lower.contains(pattern)) {
        return RelayError::ConnectTimeout(timeout);
    }

    RelayError::ConnectFailed(message.to_string())
}
