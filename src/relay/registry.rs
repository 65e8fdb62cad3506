//! Session registry: the single source of truth for who is connected to what.
//!
//! # Architecture
//!
//! - `sessions`: `DashMap<client identity, Arc<SessionEntry>>`. Each entry pairs
//!   the [`Session`] record (behind its own lock) with the
//!   [`RemoteShellConnection`] serving it. Map operations are sharded, and
//!   network I/O only ever happens on an `Arc` cloned out of the map, so a slow
//!   session never stalls another.
//! - `pending`: identities with a create in flight, each with the token that
//!   cancels its connect. A second create for the same identity is rejected
//!   while the first is pending.
//!
//! # Invariants
//!
//! - An identity maps to at most one entry. A create for an identity with a
//!   live entry fails with [`RelayError::SessionExists`]; an entry whose shell
//!   already closed is torn down and replaced.
//! - An entry is published only after its connection is established, and is
//!   removed atomically before its connection is torn down. Callers never see
//!   a half-registered session.
//! - `last_activity` strictly increases on every successful input, resize and
//!   inbound output chunk.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ConnectionEvent, RemoteShellConnection};
use super::error::RelayError;
use super::transport::ShellTransport;
use super::types::{ConnectionConfig, Session, SessionInfo, SessionStatus, ShellEvent};

/// Channel on which a client receives the events of its session.
pub type EventSink = mpsc::UnboundedSender<ShellEvent>;

struct SessionEntry {
    session: RwLock<Session>,
    connection: Arc<RemoteShellConnection>,
}

impl SessionEntry {
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) -> DateTime<Utc> {
        self.write().touch(Utc::now())
    }
}

/// Removes the pending marker for an identity when the create finishes,
/// however it finishes.
struct Reservation<'a> {
    pending: &'a DashMap<String, CancellationToken>,
    identity: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.identity);
    }
}

pub struct SessionRegistry {
    transport: Arc<dyn ShellTransport>,
    sessions: DashMap<String, Arc<SessionEntry>>,
    pending: DashMap<String, CancellationToken>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn ShellTransport>) -> Self {
        Self {
            transport,
            sessions: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Connect `identity` to the host in `config` and publish the session.
    ///
    /// On success the client's `sink` receives `Connected` first, followed by
    /// the shell's output, errors and a final `Disconnected`. On failure
    /// nothing is published and the connection attempt is fully torn down.
    pub async fn create_session(
        &self,
        identity: &str,
        config: ConnectionConfig,
        sink: EventSink,
    ) -> Result<Session, RelayError> {
        self.create_session_with_cancel(identity, config, sink, CancellationToken::new())
            .await
    }

    /// [`create_session`](Self::create_session) driven by a caller-owned token.
    ///
    /// Cancelling `cancel` at any point, including before this future is
    /// first polled, leaves nothing published and no connection open.
    pub async fn create_session_with_cancel(
        &self,
        identity: &str,
        config: ConnectionConfig,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Result<Session, RelayError> {
        config.validate()?;

        let reservation = self.reserve(identity, cancel.clone())?;
        if cancel.is_cancelled() {
            debug!("Create for client {} cancelled before connecting", identity);
            return Err(RelayError::Cancelled);
        }

        if let Some(existing) = self.entry(identity) {
            if existing.connection.is_connected() {
                return Err(RelayError::SessionExists(identity.to_string()));
            }
            debug!("Replacing closed session for client {}", identity);
            self.remove_and_close(identity).await;
        }

        let mut session = Session::new(identity, config);
        let (connection, events) = RemoteShellConnection::new(self.transport.clone());
        let connection = Arc::new(connection);

        info!(
            "Creating session {} for client {} to {}@{}",
            session.session_id,
            identity,
            session.config.username,
            session.config.endpoint()
        );

        if let Err(e) = connection.connect(&session.config, &cancel).await {
            session.transition(SessionStatus::Error);
            warn!("Session {} for client {} failed: {}", session.session_id, identity, e);
            return Err(e);
        }

        if cancel.is_cancelled() {
            connection.disconnect().await;
            return Err(RelayError::Cancelled);
        }

        session.mark_connected(Utc::now());
        let entry = Arc::new(SessionEntry {
            session: RwLock::new(session.clone()),
            connection,
        });
        self.sessions.insert(identity.to_string(), entry.clone());
        drop(reservation);

        // a disconnect that raced the insert only saw the token
        if cancel.is_cancelled() {
            self.remove_and_close(identity).await;
            return Err(RelayError::Cancelled);
        }

        let _ = sink.send(ShellEvent::Connected {
            session_id: session.session_id.clone(),
            message: format!("Connected to {}", session.config.endpoint()),
            connected_at: session
                .connected_at
                .unwrap_or(session.created_at)
                .to_rfc3339(),
        });
        tokio::spawn(forward_events(entry, events, sink));

        info!("Session {} connected for client {}", session.session_id, identity);
        Ok(session)
    }

    pub fn get_session(&self, identity: &str) -> Option<Session> {
        self.entry(identity).map(|entry| entry.read().clone())
    }

    pub fn get_connection(&self, identity: &str) -> Option<Arc<RemoteShellConnection>> {
        self.entry(identity).map(|entry| entry.connection.clone())
    }

    /// Forward input to the shell and record activity.
    pub async fn send_input(&self, identity: &str, data: &str) -> Result<(), RelayError> {
        let entry = self.connected_entry(identity)?;
        entry.connection.write(data).await?;
        entry.touch();
        Ok(())
    }

    pub async fn resize_terminal(
        &self,
        identity: &str,
        columns: u16,
        rows: u16,
    ) -> Result<(), RelayError> {
        let entry = self.connected_entry(identity)?;
        entry.connection.resize(columns, rows).await?;
        entry.touch();
        Ok(())
    }

    /// Remove and tear down the session for `identity`, cancelling a create
    /// still in flight. Idempotent; never fails.
    ///
    /// Returns `false` when there was neither a session nor a pending create.
    pub async fn disconnect_session(&self, identity: &str) -> bool {
        let cancelled = match self.pending.get(identity) {
            Some(pending) => {
                debug!("Cancelling in-flight connect for client {}", identity);
                pending.cancel();
                true
            }
            None => false,
        };
        let closed = self.remove_and_close(identity).await;
        cancelled || closed
    }

    /// Snapshot of all sessions, in no particular order.
    pub fn list_active_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|entry| entry.value().read().clone())
            .collect()
    }

    pub fn session_infos(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|entry| entry.value().read().info())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Disconnect every session idle for longer than `threshold`.
    ///
    /// Idleness is checked again at removal, so a session that saw activity
    /// after the scan survives. Entries that vanish mid-scan are skipped.
    pub async fn reap_inactive(&self, threshold: Duration) -> usize {
        let now = Utc::now();
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().read().idle_for(now) > threshold)
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for identity in candidates {
            let removed = self.sessions.remove_if(&identity, |_, entry| {
                entry.read().idle_for(Utc::now()) > threshold
            });
            if let Some((_, entry)) = removed {
                info!(
                    "Reaping session {} for client {} (idle longer than {:?})",
                    entry.read().session_id,
                    identity,
                    threshold
                );
                close_entry(&identity, entry).await;
                reaped += 1;
            }
        }

        if reaped > 0 {
            info!("Reaped {} inactive session(s)", reaped);
        }
        reaped
    }

    /// Cancel in-flight creates and disconnect everything.
    pub async fn shutdown(&self) {
        for pending in self.pending.iter() {
            pending.value().cancel();
        }

        let identities: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        info!("Disconnecting {} session(s)", identities.len());
        join_all(identities.iter().map(|id| self.remove_and_close(id))).await;
    }

    fn reserve(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> Result<Reservation<'_>, RelayError> {
        match self.pending.entry(identity.to_string()) {
            Entry::Occupied(_) => Err(RelayError::SessionExists(identity.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(cancel);
                Ok(Reservation {
                    pending: &self.pending,
                    identity: identity.to_string(),
                })
            }
        }
    }

    fn entry(&self, identity: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.get(identity).map(|entry| entry.value().clone())
    }

    fn connected_entry(&self, identity: &str) -> Result<Arc<SessionEntry>, RelayError> {
        let entry = self
            .entry(identity)
            .ok_or_else(|| RelayError::SessionNotFound(identity.to_string()))?;
        if !entry.connection.is_connected() {
            return Err(RelayError::NotConnected(identity.to_string()));
        }
        Ok(entry)
    }

    async fn remove_and_close(&self, identity: &str) -> bool {
        match self.sessions.remove(identity) {
            Some((_, entry)) => {
                close_entry(identity, entry).await;
                true
            }
            None => {
                debug!("No session to disconnect for client {}", identity);
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, identity: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entry(identity) {
            entry.write().last_activity = at;
        }
    }
}

async fn close_entry(identity: &str, entry: Arc<SessionEntry>) {
    entry.write().transition(SessionStatus::Disconnecting);
    entry.connection.disconnect().await;

    let session_id = {
        let mut session = entry.write();
        session.transition(SessionStatus::Disconnected);
        session.connected = false;
        session.session_id.clone()
    };
    info!("Session {} for client {} disconnected", session_id, identity);
}

/// Apply connection events to the session record and relay them to the client.
async fn forward_events(
    entry: Arc<SessionEntry>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    sink: EventSink,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Data(data) => {
                entry.touch();
                let _ = sink.send(ShellEvent::Output { data });
            }
            ConnectionEvent::Error(e) => {
                entry.write().transition(SessionStatus::Error);
                let _ = sink.send(ShellEvent::error(&e));
            }
            ConnectionEvent::Closed => {
                {
                    let mut session = entry.write();
                    session.transition(SessionStatus::Disconnected);
                    session.connected = false;
                }
                let _ = sink.send(ShellEvent::Disconnected {
                    message: "Connection closed".to_string(),
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::relay::error::ErrorKind;
    use crate::relay::testing::{MockBehavior, MockState, MockTransport};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("h", "u").with_port(22).with_password("p")
    }

    fn registry_with(transport: MockTransport) -> (Arc<SessionRegistry>, Arc<MockState>) {
        let state = transport.state.clone();
        (Arc::new(SessionRegistry::new(Arc::new(transport))), state)
    }

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<ShellEvent>) {
        mpsc::unbounded_channel()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ShellEvent>) -> ShellEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("sink open")
    }

    mod scenarios {
        use super::*;

        #[tokio::test]
        async fn test_create_session_connects() {
            let (registry, _) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();

            let session = registry.create_session("c1", config(), tx).await.unwrap();

            assert_eq!(session.status, SessionStatus::Connected);
            assert!(session.connected);
            assert!(!session.session_id.is_empty());
            assert!(session.connected_at.is_some());
            assert_eq!(registry.count(), 1);
            assert_eq!(
                registry.get_session("c1").unwrap().session_id,
                session.session_id
            );
            assert!(registry.get_connection("c1").unwrap().is_connected());
        }

        #[tokio::test]
        async fn test_rejected_credentials_publish_nothing() {
            let (registry, state) = registry_with(MockTransport::new(MockBehavior::RejectAuth));
            let (tx, _rx) = sink();

            let err = registry.create_session("c1", config(), tx).await.unwrap_err();

            assert_eq!(err.kind(), ErrorKind::AuthFailed);
            assert!(registry.list_active_sessions().is_empty());
            assert_eq!(state.live_handles(), 0);
        }

        #[tokio::test]
        async fn test_send_input_forwards_exact_bytes() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();

            registry.send_input("c1", "ls\n").await.unwrap();

            assert_eq!(state.written(), b"ls\n");
        }

        #[tokio::test]
        async fn test_send_input_unknown_identity() {
            let (registry, _) = registry_with(MockTransport::accepting());

            let err = registry.send_input("unknown", "x").await.unwrap_err();

            assert_eq!(err, RelayError::SessionNotFound("unknown".into()));
            assert_eq!(registry.count(), 0);
        }

        #[tokio::test]
        async fn test_invalid_config_never_connects() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();

            let err = registry
                .create_session("c1", ConnectionConfig::new("", "u"), tx)
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
            assert_eq!(state.connects(), 0);
        }
    }

    mod identity {
        use super::*;

        #[tokio::test]
        async fn test_duplicate_live_identity_rejected() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            let first = registry.create_session("c1", config(), tx.clone()).await.unwrap();

            let err = registry.create_session("c1", config(), tx).await.unwrap_err();

            assert_eq!(err.kind(), ErrorKind::SessionExists);
            assert_eq!(state.connects(), 1);
            assert_eq!(registry.get_session("c1").unwrap().session_id, first.session_id);
        }

        #[tokio::test]
        async fn test_concurrent_creates_yield_one_entry() {
            let transport = MockTransport::accepting().with_connect_delay(Duration::from_millis(50));
            let (registry, state) = registry_with(transport);

            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let registry = registry.clone();
                    let (tx, _rx) = sink();
                    tokio::spawn(async move { registry.create_session("c1", config(), tx).await })
                })
                .collect();
            let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

            let ok = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(ok, 1);
            assert!(results.iter().any(|r| matches!(r, Err(RelayError::SessionExists(_)))));
            assert_eq!(registry.count(), 1);
            assert_eq!(state.connects(), 1);
            assert_eq!(state.live_handles(), 1);
        }

        #[tokio::test]
        async fn test_failed_create_leaves_identity_free() {
            let transport = Arc::new(MockTransport::new(MockBehavior::RejectAuth));
            let state = transport.state.clone();
            let registry = SessionRegistry::new(transport.clone());
            let (tx, _rx) = sink();
            assert!(registry.create_session("c1", config(), tx.clone()).await.is_err());

            transport.set_behavior(MockBehavior::Accept);
            registry.create_session("c1", config(), tx).await.unwrap();

            assert_eq!(registry.count(), 1);
            assert_eq!(state.connects(), 2);
        }

        #[tokio::test]
        async fn test_closed_entry_is_replaced() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, mut rx) = sink();
            let first = registry.create_session("c1", config(), tx.clone()).await.unwrap();

            state.end_stream();
            assert!(matches!(next_event(&mut rx).await, ShellEvent::Connected { .. }));
            assert!(matches!(next_event(&mut rx).await, ShellEvent::Disconnected { .. }));

            let closed = registry.get_session("c1").unwrap();
            assert_eq!(closed.status, SessionStatus::Disconnected);
            assert!(!closed.connected);
            let err = registry.send_input("c1", "x").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotConnected);

            let second = registry.create_session("c1", config(), tx).await.unwrap();
            assert_ne!(second.session_id, first.session_id);
            assert_eq!(registry.count(), 1);
            assert_eq!(state.connects(), 2);
            assert_eq!(state.live_handles(), 1);
        }
    }

    mod disconnect {
        use super::*;

        #[tokio::test]
        async fn test_create_with_cancelled_token_never_connects() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            let cancel = CancellationToken::new();
            cancel.cancel();

            let result = registry
                .create_session_with_cancel("c1", config(), tx, cancel)
                .await;

            assert_eq!(result.unwrap_err(), RelayError::Cancelled);
            assert_eq!(state.connects(), 0);
            assert_eq!(registry.count(), 0);
            assert!(registry.pending.is_empty());
        }

        #[tokio::test]
        async fn test_caller_token_cancels_in_flight_create() {
            let (registry, state) = registry_with(MockTransport::new(MockBehavior::Hang));
            let (tx, _rx) = sink();
            let cancel = CancellationToken::new();

            let creating = {
                let registry = registry.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    registry.create_session_with_cancel("c1", config(), tx, cancel).await
                })
            };
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();

            let result = creating.await.unwrap();
            assert_eq!(result.unwrap_err(), RelayError::Cancelled);
            assert_eq!(registry.count(), 0);
            assert_eq!(state.live_handles(), 0);
        }

        #[tokio::test]
        async fn test_disconnect_is_idempotent() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();
            let connection = registry.get_connection("c1").unwrap();

            assert!(registry.disconnect_session("c1").await);
            assert!(!registry.disconnect_session("c1").await);

            assert!(registry.get_session("c1").is_none());
            assert!(!connection.is_connected());
            assert_eq!(state.live_handles(), 0);
        }

        #[tokio::test]
        async fn test_concurrent_disconnects() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();

            let (first, second) = tokio::join!(
                registry.disconnect_session("c1"),
                registry.disconnect_session("c1")
            );

            assert!(first ^ second);
            assert_eq!(registry.count(), 0);
            assert_eq!(state.live_handles(), 0);
        }

        #[tokio::test]
        async fn test_disconnect_unknown_is_noop() {
            let (registry, _) = registry_with(MockTransport::accepting());
            assert!(!registry.disconnect_session("nobody").await);
            assert_eq!(registry.count(), 0);
        }

        #[tokio::test]
        async fn test_disconnect_cancels_in_flight_create() {
            let (registry, state) = registry_with(MockTransport::new(MockBehavior::Hang));
            let (tx, _rx) = sink();

            let creating = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.create_session("c1", config(), tx).await })
            };
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(registry.disconnect_session("c1").await);

            let result = creating.await.unwrap();
            assert_eq!(result.unwrap_err(), RelayError::Cancelled);
            assert_eq!(registry.count(), 0);
            assert_eq!(state.live_handles(), 0);

            // the identity is free again
            assert!(registry.pending.is_empty());
        }

        #[tokio::test]
        async fn test_shutdown_disconnects_everything() {
            let (registry, state) = registry_with(MockTransport::accepting());
            for id in ["c1", "c2", "c3"] {
                let (tx, _rx) = sink();
                registry.create_session(id, config(), tx).await.unwrap();
            }
            assert_eq!(state.live_handles(), 3);

            registry.shutdown().await;

            assert_eq!(registry.count(), 0);
            assert_eq!(state.live_handles(), 0);
        }
    }

    mod activity {
        use super::*;

        #[tokio::test]
        async fn test_activity_strictly_increases() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, mut rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();

            let t0 = registry.get_session("c1").unwrap().last_activity;
            registry.send_input("c1", "a").await.unwrap();
            let t1 = registry.get_session("c1").unwrap().last_activity;
            registry.resize_terminal("c1", 100, 30).await.unwrap();
            let t2 = registry.get_session("c1").unwrap().last_activity;

            state.push_output(b"out");
            assert!(matches!(next_event(&mut rx).await, ShellEvent::Connected { .. }));
            assert_eq!(
                next_event(&mut rx).await,
                ShellEvent::Output { data: "out".into() }
            );
            let t3 = registry.get_session("c1").unwrap().last_activity;

            assert!(t1 > t0);
            assert!(t2 > t1);
            assert!(t3 > t2);
            assert_eq!(state.resizes(), vec![(100, 30)]);
        }

        #[tokio::test]
        async fn test_resize_unknown_identity() {
            let (registry, _) = registry_with(MockTransport::accepting());
            let err = registry.resize_terminal("nobody", 80, 24).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        }

        #[tokio::test]
        async fn test_failed_input_does_not_touch() {
            let (registry, _) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();
            let before = registry.get_session("c1").unwrap().last_activity;

            assert!(registry.resize_terminal("c1", 0, 0).await.is_err());

            assert_eq!(registry.get_session("c1").unwrap().last_activity, before);
        }
    }

    mod reaping {
        use super::*;

        const THRESHOLD: Duration = Duration::from_secs(30 * 60);

        #[tokio::test]
        async fn test_reap_respects_threshold() {
            let (registry, state) = registry_with(MockTransport::accepting());
            for id in ["stale", "fresh"] {
                let (tx, _rx) = sink();
                registry.create_session(id, config(), tx).await.unwrap();
            }
            let now = Utc::now();
            registry.set_last_activity("stale", now - TimeDelta::minutes(30) - TimeDelta::seconds(5));
            registry.set_last_activity("fresh", now - TimeDelta::minutes(30) + TimeDelta::seconds(5));

            let reaped = registry.reap_inactive(THRESHOLD).await;

            assert_eq!(reaped, 1);
            assert!(registry.get_session("stale").is_none());
            assert!(registry.get_session("fresh").is_some());
            assert_eq!(state.live_handles(), 1);
        }

        #[tokio::test]
        async fn test_reap_tolerates_concurrent_disconnect() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, _rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();
            registry.set_last_activity("c1", Utc::now() - TimeDelta::hours(2));

            let (reaped, _) = tokio::join!(
                registry.reap_inactive(THRESHOLD),
                registry.disconnect_session("c1")
            );

            assert!(reaped <= 1);
            assert_eq!(registry.count(), 0);
            assert_eq!(state.live_handles(), 0);
        }

        #[tokio::test]
        async fn test_reap_empty_registry() {
            let (registry, _) = registry_with(MockTransport::accepting());
            assert_eq!(registry.reap_inactive(THRESHOLD).await, 0);
        }
    }

    mod events {
        use super::*;

        #[tokio::test]
        async fn test_connected_precedes_output() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, mut rx) = sink();
            let session = registry.create_session("c1", config(), tx).await.unwrap();
            state.push_output(b"$ ");

            match next_event(&mut rx).await {
                ShellEvent::Connected { session_id, message, .. } => {
                    assert_eq!(session_id, session.session_id);
                    assert_eq!(message, "Connected to h:22");
                }
                other => panic!("expected connected, got {:?}", other),
            }
            assert_eq!(next_event(&mut rx).await, ShellEvent::Output { data: "$ ".into() });
        }

        #[tokio::test]
        async fn test_read_error_marks_session_error() {
            let (registry, state) = registry_with(MockTransport::accepting());
            let (tx, mut rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();

            state.fail_stream(RelayError::Io("reset".into()));

            next_event(&mut rx).await;
            match next_event(&mut rx).await {
                ShellEvent::Error { error_type, .. } => assert_eq!(error_type, ErrorKind::IoError),
                other => panic!("expected error, got {:?}", other),
            }
            assert!(matches!(next_event(&mut rx).await, ShellEvent::Disconnected { .. }));
            assert_eq!(registry.get_session("c1").unwrap().status, SessionStatus::Error);
        }

        #[tokio::test]
        async fn test_client_disconnect_ends_with_disconnected() {
            let (registry, _) = registry_with(MockTransport::accepting());
            let (tx, mut rx) = sink();
            registry.create_session("c1", config(), tx).await.unwrap();

            registry.disconnect_session("c1").await;

            next_event(&mut rx).await;
            assert!(matches!(next_event(&mut rx).await, ShellEvent::Disconnected { .. }));
        }
    }
}
