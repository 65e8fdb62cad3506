//! In-memory remote-shell capability for tests.
//!
//! [`MockTransport`] hands out handles whose streams are fed by the test
//! through [`MockState`]; everything written to a stream is recorded.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::RelayError;
use super::transport::{ShellHandle, ShellStream, ShellTransport, StreamReader, StreamWriter};
use super::types::ConnectionConfig;

type Feed = mpsc::UnboundedSender<Result<Vec<u8>, RelayError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockBehavior {
    /// Authenticate and open streams normally
    Accept,
    /// Reject credentials
    RejectAuth,
    /// Never finish connecting
    Hang,
    /// Connect, then fail to open the interactive stream
    FailStream,
}

/// Observations shared between the transport and the test.
#[derive(Default)]
pub(crate) struct MockState {
    pub connects: AtomicUsize,
    pub live_handles: AtomicUsize,
    pub streams_closed: AtomicUsize,
    pub written: Mutex<Vec<u8>>,
    pub resizes: Mutex<Vec<(u16, u16)>>,
    panicking_closes: AtomicUsize,
    feeds: Mutex<Vec<Feed>>,
}

impl MockState {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.resizes.lock().unwrap().clone()
    }

    /// Deliver output on the most recently opened stream.
    pub fn push_output(&self, data: &[u8]) {
        if let Some(feed) = self.feeds.lock().unwrap().last() {
            let _ = feed.send(Ok(data.to_vec()));
        }
    }

    /// Fail the next read on the most recently opened stream.
    pub fn fail_stream(&self, err: RelayError) {
        if let Some(feed) = self.feeds.lock().unwrap().last() {
            let _ = feed.send(Err(err));
        }
    }

    /// Make the next `count` handle closes panic instead of closing.
    pub fn panic_on_close(&self, count: usize) {
        self.panicking_closes.store(count, Ordering::SeqCst);
    }

    fn take_close_panic(&self) -> bool {
        self.panicking_closes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Simulate the remote shell exiting on the most recently opened stream.
    pub fn end_stream(&self) {
        self.feeds.lock().unwrap().pop();
    }
}

pub(crate) struct MockTransport {
    pub state: Arc<MockState>,
    behavior: Mutex<MockBehavior>,
    connect_delay: Option<Duration>,
    support_resize: bool,
}

impl MockTransport {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            state: Arc::new(MockState::default()),
            behavior: Mutex::new(behavior),
            connect_delay: None,
            support_resize: true,
        }
    }

    pub fn accepting() -> Self {
        Self::new(MockBehavior::Accept)
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn without_resize(mut self) -> Self {
        self.support_resize = false;
        self
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

#[async_trait]
impl ShellTransport for MockTransport {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn ShellHandle>, RelayError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            MockBehavior::RejectAuth => Err(RelayError::AuthFailed(
                "password authentication rejected".into(),
            )),
            MockBehavior::Hang => std::future::pending().await,
            MockBehavior::Accept | MockBehavior::FailStream => {
                self.state.live_handles.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockHandle {
                    state: self.state.clone(),
                    closed: AtomicBool::new(false),
                    fail_stream: behavior == MockBehavior::FailStream,
                    support_resize: self.support_resize,
                }))
            }
        }
    }
}

struct MockHandle {
    state: Arc<MockState>,
    closed: AtomicBool,
    fail_stream: bool,
    support_resize: bool,
}

#[async_trait]
impl ShellHandle for MockHandle {
    async fn open_interactive_stream(
        &self,
        _terminal: &str,
        _columns: u16,
        _rows: u16,
    ) -> Result<ShellStream, RelayError> {
        if self.fail_stream {
            return Err(RelayError::StreamUnavailable("PTY request refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.feeds.lock().unwrap().push(tx);
        Ok(ShellStream {
            reader: Box::new(MockReader { rx }),
            writer: Box::new(MockWriter {
                state: self.state.clone(),
                closed: AtomicBool::new(false),
                support_resize: self.support_resize,
            }),
        })
    }

    async fn close(&self) -> Result<(), RelayError> {
        if self.state.take_close_panic() {
            panic!("transport blew up while closing");
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>, RelayError>>,
}

#[async_trait]
impl StreamReader for MockReader {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        match self.rx.recv().await {
            Some(Ok(data)) => Ok(Some(data)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

struct MockWriter {
    state: Arc<MockState>,
    closed: AtomicBool,
    support_resize: bool,
}

#[async_trait]
impl StreamWriter for MockWriter {
    async fn write(&self, data: &[u8]) -> Result<(), RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Io("channel closed".into()));
        }
        self.state.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn resize(&self, columns: u16, rows: u16) -> Result<bool, RelayError> {
        if !self.support_resize {
            return Ok(false);
        }
        self.state.resizes.lock().unwrap().push((columns, rows));
        Ok(true)
    }

    async fn close(&self) -> Result<(), RelayError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.streams_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
