//! Data model and wire types for the SSH relay.
//!
//! - [`ConnectionConfig`]: what a browser client asks to connect to.
//! - [`Session`]: the registry's record of one client-to-host binding.
//! - [`SessionInfo`] / [`SessionListResponse`]: read-only snapshots for ops tooling.
//! - [`ClientMessage`] / [`ShellEvent`]: the JSON messages exchanged over the
//!   gateway WebSocket, tagged by `type`.

use chrono::{DateTime, TimeDelta, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::resolve_connect_timeout;
use super::error::{ErrorKind, RelayError};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default terminal kind requested for the PTY
pub const DEFAULT_TERMINAL_TYPE: &str = "xterm-256color";

/// Default terminal width in columns
pub const DEFAULT_COLUMNS: u16 = 80;

/// Default terminal height in rows
pub const DEFAULT_ROWS: u16 = 24;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_terminal_type() -> String {
    DEFAULT_TERMINAL_TYPE.to_string()
}

fn default_columns() -> u16 {
    DEFAULT_COLUMNS
}

fn default_rows() -> u16 {
    DEFAULT_ROWS
}

/// Connection parameters supplied by the client.
///
/// Immutable once accepted by the registry. The `Debug` implementation redacts
/// the password and private key.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// PEM-encoded private key text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<String>,
    /// Connect timeout in milliseconds (default: 20000, env: SSH_CONNECT_TIMEOUT_MS)
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_terminal_type")]
    pub terminal_type: String,
    #[serde(default = "default_columns")]
    pub columns: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl ConnectionConfig {
    /// Create a config with defaults for everything but host and username.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            password: None,
            private_key: None,
            private_key_passphrase: None,
            timeout_ms: None,
            terminal_type: default_terminal_type(),
            columns: DEFAULT_COLUMNS,
            rows: DEFAULT_ROWS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, pem: impl Into<String>, passphrase: Option<String>) -> Self {
        self.private_key = Some(pem.into());
        self.private_key_passphrase = passphrase;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_size(mut self, columns: u16, rows: u16) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    /// Check the invariants that must hold before any network I/O.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.host.trim().is_empty() {
            return Err(RelayError::ConfigInvalid("host is required".into()));
        }
        if self.username.trim().is_empty() {
            return Err(RelayError::ConfigInvalid("username is required".into()));
        }
        if self.port == 0 {
            return Err(RelayError::ConfigInvalid(
                "port must be between 1 and 65535".into(),
            ));
        }
        if self.columns == 0 || self.rows == 0 {
            return Err(RelayError::ConfigInvalid(format!(
                "terminal size must be positive, got {}x{}",
                self.columns, self.rows
            )));
        }
        if self.terminal_type.trim().is_empty() {
            return Err(RelayError::ConfigInvalid("terminal type is required".into()));
        }
        Ok(())
    }

    /// Effective connect timeout (config value, then environment, then default).
    pub fn connect_timeout(&self) -> std::time::Duration {
        resolve_connect_timeout(self.timeout_ms)
    }

    /// Credentials in the order they should be attempted.
    ///
    /// A private key is preferred; the password is the fallback. With neither the
    /// result is empty and the connection attempts anonymous ("none") auth.
    pub fn credentials(&self) -> Vec<Credential> {
        let mut credentials = Vec::with_capacity(2);
        if let Some(pem) = self.private_key.as_ref().filter(|k| !k.trim().is_empty()) {
            credentials.push(Credential::PrivateKey {
                pem: pem.clone(),
                passphrase: self.private_key_passphrase.clone(),
            });
        }
        if let Some(password) = &self.password {
            credentials.push(Credential::Password(password.clone()));
        }
        credentials
    }

    /// `host:port` label used in logs and messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("terminal_type", &self.terminal_type)
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .finish()
    }
}

/// A single credential to present to the SSH server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    PrivateKey {
        pem: String,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::PrivateKey { .. } => f.write_str("PrivateKey(<redacted>)"),
        }
    }
}

/// Lifecycle status of a session.
///
/// `Connecting → Connected → Disconnecting → Disconnected`, with `Error`
/// reachable from `Connecting` or `Connected`. Nothing leaves `Disconnected`
/// or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Error,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Disconnecting)
                // the remote shell exited on its own
                | (Connected, Disconnected)
                | (Connected, Error)
                | (Disconnecting, Disconnected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Disconnected | SessionStatus::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Disconnecting => write!(f, "disconnecting"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// One logical client-to-host binding, owned by the registry.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub client_id: String,
    pub config: ConnectionConfig,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub connected: bool,
    pub status: SessionStatus,
}

impl Session {
    /// New session in `Connecting` status with a fresh UUID.
    pub fn new(client_id: impl Into<String>, config: ConnectionConfig) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            config,
            created_at: now,
            connected_at: None,
            last_activity: now,
            connected: false,
            status: SessionStatus::Connecting,
        }
    }

    /// Move to `next` if the transition is legal. Returns whether it applied.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next != SessionStatus::Connected {
            self.connected = false;
        }
        true
    }

    pub fn mark_connected(&mut self, now: DateTime<Utc>) {
        if self.transition(SessionStatus::Connected) {
            self.connected = true;
            self.connected_at = Some(now);
            self.last_activity = self.last_activity.max(now);
        }
    }

    /// Advance `last_activity` to `now`, or by one microsecond when the clock
    /// has not moved, so every call strictly increases it.
    pub fn touch(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_activity = if now > self.last_activity {
            now
        } else {
            self.last_activity + TimeDelta::microseconds(1)
        };
        self.last_activity
    }

    /// Time since the last activity, zero if the clock went backwards.
    pub fn idle_for(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.last_activity)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            client_id: self.client_id.clone(),
            host: self.config.host.clone(),
            port: self.config.port,
            username: self.config.username.clone(),
            created_at: self.created_at.to_rfc3339(),
            connected_at: self.connected_at.map(|t| t.to_rfc3339()),
            last_activity: self.last_activity.to_rfc3339(),
            connected: self.connected,
            status: self.status,
        }
    }
}

/// Read-only session metadata for status reporting
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    /// Identity of the owning gateway connection
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// RFC3339 timestamps
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    pub last_activity: String,
    pub connected: bool,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionListResponse {
    /// List of active terminal sessions
    pub sessions: Vec<SessionInfo>,
    /// Total number of active sessions
    pub count: usize,
}

impl From<Vec<SessionInfo>> for SessionListResponse {
    fn from(sessions: Vec<SessionInfo>) -> Self {
        let count = sessions.len();
        Self { sessions, count }
    }
}

/// Response for `GET /api/info`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub status: String,
    pub active_sessions: usize,
    pub timestamp: String,
}

/// Messages a browser client sends over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Connect { config: ConnectionConfig },
    Input { data: String },
    Resize { columns: u16, rows: u16 },
    Disconnect,
}

/// Events pushed to the owning browser client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShellEvent {
    #[serde(rename_all = "camelCase")]
    Connected {
        session_id: String,
        message: String,
        connected_at: String,
    },
    Output {
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        error_type: ErrorKind,
    },
    Disconnected {
        message: String,
    },
}

impl ShellEvent {
    pub fn error(err: &RelayError) -> Self {
        ShellEvent::Error {
            message: err.to_string(),
            error_type: err.kind(),
        }
    }
}
