//! russh-backed implementation of the transport seams.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: keepalive every 30 seconds, at most 3 missed
//!    probes, zlib compression when enabled. No inactivity timeout; idle
//!    sessions are the reaper's business.
//!
//! 2. **Connection Establishment**: TCP + handshake to `host:port`. Failures are
//!    classified into auth, timeout or generic connect errors.
//!
//! 3. **Authentication**: an [`AuthChain`] built from the client's credentials
//!    (key, then password, else "none").
//!
//! 4. **Shell**: open a session channel, request a PTY (pixel size is 8x16 per
//!    cell), start the shell and split the channel into read/write halves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Disconnect, client};
use tracing::{debug, info};

use super::auth::{AuthChain, AuthStrategy};
use super::error::{RelayError, classify_connect_error};
use super::session::SshClientHandler;
use super::transport::{ShellHandle, ShellStream, ShellTransport, StreamReader, StreamWriter};
use super::types::ConnectionConfig;

/// Pixel width reported per terminal column
const CELL_WIDTH_PX: u32 = 8;

/// Pixel height reported per terminal row
const CELL_HEIGHT_PX: u32 = 16;

/// Build russh client configuration.
///
/// Creates an `Arc<client::Config>` with:
/// - No inactivity timeout (interactive sessions may sit idle)
/// - Keepalive interval of 30 seconds with max 3 keepalives
/// - Compression preference based on `compress` (ZLIB if enabled, NONE if disabled)
pub(crate) fn build_client_config(compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// [`ShellTransport`] over russh.
pub struct RusshTransport {
    compress: bool,
}

impl RusshTransport {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }
}

#[async_trait]
impl ShellTransport for RusshTransport {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn ShellHandle>, RelayError> {
        let endpoint = config.endpoint();
        let timeout = config.connect_timeout();
        let client_config = build_client_config(self.compress);
        let handler = SshClientHandler::new(endpoint.clone());

        let mut handle = client::connect(client_config, (config.host.as_str(), config.port), handler)
            .await
            .map_err(|e| classify_connect_error(&e.to_string(), timeout))?;

        let chain = AuthChain::from_credentials(&config.credentials());
        let authenticated = chain.authenticate(&mut handle, &config.username).await?;
        if !authenticated {
            return Err(RelayError::AuthFailed(
                "no authentication methods succeeded".to_string(),
            ));
        }

        info!("SSH connection established to {}@{}", config.username, endpoint);
        Ok(Box::new(RusshHandle { handle, endpoint }))
    }
}

/// Authenticated russh connection.
pub struct RusshHandle {
    handle: client::Handle<SshClientHandler>,
    endpoint: String,
}

#[async_trait]
impl ShellHandle for RusshHandle {
    async fn open_interactive_stream(
        &self,
        terminal: &str,
        columns: u16,
        rows: u16,
    ) -> Result<ShellStream, RelayError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RelayError::StreamUnavailable(format!("failed to open channel: {}", e)))?;

        channel
            .request_pty(
                false,
                terminal,
                u32::from(columns),
                u32::from(rows),
                u32::from(columns) * CELL_WIDTH_PX,
                u32::from(rows) * CELL_HEIGHT_PX,
                &[],
            )
            .await
            .map_err(|e| RelayError::StreamUnavailable(format!("failed to request PTY: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| RelayError::StreamUnavailable(format!("failed to start shell: {}", e)))?;

        debug!("Shell opened on {} ({}x{} {})", self.endpoint, columns, rows, terminal);

        let (read_half, write_half) = channel.split();
        Ok(ShellStream {
            reader: Box::new(RusshReader { read_half }),
            writer: Box::new(RusshWriter { write_half }),
        })
    }

    async fn close(&self) -> Result<(), RelayError> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
            .map_err(|e| RelayError::Io(format!("failed to disconnect from {}: {}", self.endpoint, e)))
    }
}

struct RusshReader {
    read_half: ChannelReadHalf,
}

#[async_trait]
impl StreamReader for RusshReader {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        loop {
            match self.read_half.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                // PTY sessions merge stderr, but some servers still tag it
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("Remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => {}
            }
        }
    }
}

struct RusshWriter {
    write_half: ChannelWriteHalf<client::Msg>,
}

#[async_trait]
impl StreamWriter for RusshWriter {
    async fn write(&self, data: &[u8]) -> Result<(), RelayError> {
        self.write_half
            .data(data)
            .await
            .map_err(|e| RelayError::Io(format!("failed to write to shell: {}", e)))
    }

    async fn resize(&self, columns: u16, rows: u16) -> Result<bool, RelayError> {
        self.write_half
            .window_change(
                u32::from(columns),
                u32::from(rows),
                u32::from(columns) * CELL_WIDTH_PX,
                u32::from(rows) * CELL_HEIGHT_PX,
            )
            .await
            .map_err(|e| RelayError::Io(format!("failed to resize shell: {}", e)))?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), RelayError> {
        // the peer may already have closed its side
        if let Err(e) = self.write_half.eof().await {
            debug!("Failed to send EOF before closing shell channel: {}", e);
        }
        self.write_half
            .close()
            .await
            .map_err(|e| RelayError::Io(format!("failed to close shell channel: {}", e)))
    }
}
