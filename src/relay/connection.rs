//! One live remote shell: connection, interactive stream, and its read loop.
//!
//! # Architecture
//!
//! - [`RemoteShellConnection`]: owns the authenticated handle, the write half of
//!   the interactive stream, and the background read loop that drains the read
//!   half. Output is reported as [`ConnectionEvent`]s on an unbounded channel
//!   handed to the owner at construction.
//! - The read loop is the only task touching the read half. `disconnect`
//!   cancels it and waits for it to exit before closing the stream, so close
//!   and read never race.
//!
//! # Event Ordering
//!
//! Events come from the read loop alone, so they are delivered in the order
//! the bytes arrived. `Closed` is sent exactly once per established shell and
//! is always the last event, whether the remote side hung up, a read failed,
//! or the owner called `disconnect`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::RelayError;
use super::transport::{ShellHandle, ShellStream, ShellTransport, StreamReader, StreamWriter};
use super::types::ConnectionConfig;

/// Notifications emitted by a connection to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Decoded output text
    Data(String),
    /// A read failure; `Closed` follows immediately
    Error(RelayError),
    /// The read loop exited and the shell is no longer usable
    Closed,
}

/// State that exists only while a shell is established.
struct LiveShell {
    handle: Arc<dyn ShellHandle>,
    writer: Arc<dyn StreamWriter>,
    cancel_token: CancellationToken,
    reader_task: JoinHandle<()>,
}

pub struct RemoteShellConnection {
    transport: Arc<dyn ShellTransport>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    connected: Arc<AtomicBool>,
    state: Mutex<Option<LiveShell>>,
}

impl RemoteShellConnection {
    /// Create an unconnected connection and the receiver for its events.
    pub fn new(
        transport: Arc<dyn ShellTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let connection = Self {
            transport,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(None),
        };
        (connection, rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect, authenticate and open a PTY shell sized from `config`.
    ///
    /// The configured timeout bounds both the handshake and the stream open.
    /// Cancelling `cancel` aborts whichever stage is in progress. On any failure
    /// the authenticated handle (if one was obtained) is closed before
    /// returning, and no read loop is started.
    pub async fn connect(
        &self,
        config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> Result<(), RelayError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(RelayError::ConnectFailed(
                "connection already established".to_string(),
            ));
        }

        let timeout = config.connect_timeout();
        let deadline = Instant::now() + timeout;
        let target = format!("{}@{}", config.username, config.endpoint());
        debug!("Connecting to {} (timeout {:?})", target, timeout);

        let handle: Arc<dyn ShellHandle> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            result = tokio::time::timeout_at(deadline, self.transport.connect(config)) => {
                match result {
                    Ok(handle) => Arc::from(handle?),
                    Err(_) => return Err(RelayError::ConnectTimeout(timeout)),
                }
            }
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            result = tokio::time::timeout_at(
                deadline,
                handle.open_interactive_stream(&config.terminal_type, config.columns, config.rows),
            ) => result.unwrap_or(Err(RelayError::ConnectTimeout(timeout))),
        };

        let ShellStream { reader, writer } = match opened {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(close_err) = handle.close().await {
                    warn!("Failed to close {} after aborted connect: {}", target, close_err);
                }
                return Err(e);
            }
        };

        let cancel_token = CancellationToken::new();
        self.connected.store(true, Ordering::SeqCst);
        let reader_task = tokio::spawn(read_loop(
            reader,
            cancel_token.clone(),
            self.events.clone(),
            self.connected.clone(),
            target.clone(),
        ));

        *state = Some(LiveShell {
            handle,
            writer: Arc::from(writer),
            cancel_token,
            reader_task,
        });

        info!(
            "Shell ready on {} ({}x{} {})",
            target, config.columns, config.rows, config.terminal_type
        );
        Ok(())
    }

    /// Write input to the shell. Does not touch session activity.
    pub async fn write(&self, data: &str) -> Result<(), RelayError> {
        let writer = self.live_writer().await?;
        writer.write(data.as_bytes()).await
    }

    /// Best-effort resize. A capability that cannot resize a live stream makes
    /// this a logged no-op that still succeeds.
    pub async fn resize(&self, columns: u16, rows: u16) -> Result<(), RelayError> {
        if columns == 0 || rows == 0 {
            return Err(RelayError::ConfigInvalid(format!(
                "terminal size must be positive, got {}x{}",
                columns, rows
            )));
        }

        let writer = self.live_writer().await?;
        if !writer.resize(columns, rows).await? {
            debug!("Live resize unsupported, ignoring {}x{}", columns, rows);
        }
        Ok(())
    }

    /// Stop the read loop, then close the stream and the connection.
    ///
    /// Idempotent and total: errors from the underlying close are logged.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        let Some(live) = state.take() else {
            return;
        };

        live.cancel_token.cancel();
        if let Err(e) = live.reader_task.await {
            warn!("Shell read loop ended abnormally: {}", e);
        }
        self.connected.store(false, Ordering::SeqCst);

        if let Err(e) = live.writer.close().await {
            debug!("Error closing shell stream: {}", e);
        }
        if let Err(e) = live.handle.close().await {
            warn!("Error closing SSH connection: {}", e);
        }
    }

    async fn live_writer(&self) -> Result<Arc<dyn StreamWriter>, RelayError> {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(live) if self.is_connected() => Ok(live.writer.clone()),
            _ => Err(RelayError::StreamUnavailable(
                "shell stream is not open".to_string(),
            )),
        }
    }
}

impl Drop for RemoteShellConnection {
    fn drop(&mut self) {
        if let Some(live) = self.state.get_mut() {
            live.cancel_token.cancel();
        }
    }
}

async fn read_loop(
    mut reader: Box<dyn StreamReader>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    connected: Arc<AtomicBool>,
    target: String,
) {
    let mut decoder = Utf8Decoder::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Read loop for {} cancelled", target);
                break;
            }
            result = reader.read() => match result {
                Ok(Some(chunk)) => {
                    let text = decoder.decode(&chunk);
                    if !text.is_empty() {
                        let _ = events.send(ConnectionEvent::Data(text));
                    }
                }
                Ok(None) => {
                    info!("Remote shell on {} closed", target);
                    let tail = decoder.finish();
                    if !tail.is_empty() {
                        let _ = events.send(ConnectionEvent::Data(tail));
                    }
                    break;
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", target, e);
                    let _ = events.send(ConnectionEvent::Error(e));
                    break;
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(ConnectionEvent::Closed);
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across reads is held back until its remaining
/// bytes arrive. Invalid sequences become U+FFFD.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut input = &self.pending[..];
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // incomplete sequence at the end, wait for more bytes
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let rest = input.to_vec();
        self.pending = rest;
        out
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
