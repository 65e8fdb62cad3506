//! russh client handler for relay connections.
//!
//! - `SshClientHandler`: accepts every host key (similar to
//!   `StrictHostKeyChecking=no` in OpenSSH) and logs the fingerprint it saw so
//!   an operator can audit which key a browser session trusted.
//!
//! # Thread Safety
//!
//! The `client::Handle<SshClientHandler>` is not `Clone`; the relay keeps it
//! inside [`crate::relay::ssh::RusshHandle`] and shares that behind the
//! transport's trait object.

use russh::{client, keys};
use tracing::debug;

/// Client handler for russh that accepts all host keys.
///
/// # Security Note
///
/// Host keys are not verified. Deployments exposed to untrusted networks
/// should extend this to check a known_hosts store.
pub struct SshClientHandler {
    endpoint: String,
}

impl SshClientHandler {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting host key {} for {}",
            server_public_key.fingerprint(keys::HashAlg::Sha256),
            self.endpoint
        );
        Ok(true)
    }
}
