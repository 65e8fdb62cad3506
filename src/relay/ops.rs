//! Read-only MCP tools for operators.
//!
//! - `list_sessions`: every session with endpoint, timestamps and status
//! - `get_session`: one session by client identity
//!
//! Nothing here mutates the registry.

use std::sync::Arc;

use poem_mcpserver::{Tools, tool::StructuredContent};

use super::registry::SessionRegistry;
use super::types::{SessionInfo, SessionListResponse};

/// MCP ops tool implementation over a shared registry.
pub struct RelayOpsTools {
    registry: Arc<SessionRegistry>,
}

impl RelayOpsTools {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    fn snapshot(&self) -> SessionListResponse {
        SessionListResponse::from(self.registry.session_infos())
    }

    fn lookup(&self, client_id: &str) -> Result<SessionInfo, String> {
        self.registry
            .get_session(client_id)
            .map(|session| session.info())
            .ok_or_else(|| format!("No session for client {}", client_id))
    }
}

#[Tools]
impl RelayOpsTools {
    /// List all browser terminal sessions with their metadata.
    ///
    /// Includes sessions whose remote shell has already exited but which have
    /// not yet been disconnected or reaped (`connected: false`).
    async fn list_sessions(&self) -> StructuredContent<SessionListResponse> {
        StructuredContent(self.snapshot())
    }

    /// Get the session owned by one gateway client.
    async fn get_session(
        &self,
        /// Client identity (as shown in `list_sessions`)
        client_id: String,
    ) -> Result<StructuredContent<SessionInfo>, String> {
        self.lookup(&client_id).map(StructuredContent)
    }
}
