//! Browser-facing gateway: WebSocket terminal endpoint and REST status routes.
//!
//! Each WebSocket gets a fresh client identity. Client messages are JSON
//! objects tagged by `type` ([`ClientMessage`]); everything the registry
//! reports for that client is serialized back as [`ShellEvent`]s by a
//! dedicated writer task, so socket writes never block request handling.
//!
//! When the socket closes, for whatever reason, the client's session is
//! disconnected. A connect still in flight is cancelled, including one whose
//! task has not started running yet.

use std::sync::{Arc, Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use poem::web::websocket::{Message, WebSocket, WebSocketStream};
use poem::web::{Data, Json};
use poem::{IntoResponse, handler};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{ErrorKind, RelayError};
use super::registry::{EventSink, SessionRegistry};
use super::types::{ClientMessage, ServerInfo, SessionListResponse, ShellEvent};

/// One browser client's view of the registry.
pub struct ClientGateway {
    identity: String,
    registry: Arc<SessionRegistry>,
    events: EventSink,
    /// Cancelled when the socket goes away
    closed: CancellationToken,
    /// Shared by every connect issued since the last disconnect frame
    connecting: Mutex<CancellationToken>,
}

impl ClientGateway {
    pub fn new(registry: Arc<SessionRegistry>, events: EventSink) -> Self {
        let closed = CancellationToken::new();
        let connecting = Mutex::new(closed.child_token());
        Self {
            identity: Uuid::new_v4().to_string(),
            registry,
            events,
            closed,
            connecting,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Parse and dispatch one text frame.
    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                debug!("Malformed message from client {}: {}", self.identity, e);
                self.send(ShellEvent::Error {
                    message: format!("Invalid message: {}", e),
                    error_type: ErrorKind::ConfigInvalid,
                });
            }
        }
    }

    pub async fn dispatch(&self, message: ClientMessage) {
        match message {
            ClientMessage::Connect { config } => {
                // runs on its own so a disconnect frame can cancel it
                let cancel = self.connect_token();
                let registry = self.registry.clone();
                let identity = self.identity.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let created = registry
                        .create_session_with_cancel(&identity, config, events.clone(), cancel)
                        .await;
                    if let Err(e) = created {
                        let _ = events.send(ShellEvent::error(&e));
                    }
                });
            }
            ClientMessage::Input { data } => {
                let result = self.registry.send_input(&self.identity, &data).await;
                self.report(result);
            }
            ClientMessage::Resize { columns, rows } => {
                let result = self
                    .registry
                    .resize_terminal(&self.identity, columns, rows)
                    .await;
                self.report(result);
            }
            ClientMessage::Disconnect => {
                self.cancel_connects();
                if !self.registry.disconnect_session(&self.identity).await {
                    self.send(ShellEvent::Disconnected {
                        message: "No active session".to_string(),
                    });
                }
            }
        }
    }

    /// Tear down whatever this client owns.
    pub async fn close(&self) {
        self.closed.cancel();
        self.registry.disconnect_session(&self.identity).await;
    }

    fn connect_token(&self) -> CancellationToken {
        self.connecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel every connect issued so far; later connects get a fresh token.
    fn cancel_connects(&self) {
        let mut connecting = self.connecting.lock().unwrap_or_else(PoisonError::into_inner);
        connecting.cancel();
        *connecting = self.closed.child_token();
    }

    fn report(&self, result: Result<(), RelayError>) {
        if let Err(e) = result {
            self.send(ShellEvent::error(&e));
        }
    }

    fn send(&self, event: ShellEvent) {
        let _ = self.events.send(event);
    }
}

#[handler]
pub fn terminal_socket(
    ws: WebSocket,
    Data(registry): Data<&Arc<SessionRegistry>>,
) -> impl IntoResponse {
    let registry = registry.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, registry))
}

async fn serve_socket(socket: WebSocketStream, registry: Arc<SessionRegistry>) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (events, mut event_rx) = mpsc::unbounded_channel::<ShellEvent>();
    let gateway = ClientGateway::new(registry, events);
    info!("Client {} connected", gateway.identity());

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => gateway.handle_text(&text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error for client {}: {}", gateway.identity(), e);
                break;
            }
        }
    }

    gateway.close().await;
    writer.abort();
    info!("Client {} disconnected", gateway.identity());
}

#[handler]
pub fn list_sessions(Data(registry): Data<&Arc<SessionRegistry>>) -> Json<SessionListResponse> {
    Json(session_list(registry))
}

#[handler]
pub fn server_info(Data(registry): Data<&Arc<SessionRegistry>>) -> Json<ServerInfo> {
    Json(info_for(registry))
}

fn session_list(registry: &SessionRegistry) -> SessionListResponse {
    SessionListResponse::from(registry.session_infos())
}

fn info_for(registry: &SessionRegistry) -> ServerInfo {
    ServerInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        active_sessions: registry.count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}
