//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::relay::error::RelayError;
use crate::relay::session::SshClientHandler;

/// Trait for SSH authentication strategies.
///
/// Implementations must be `Send + Sync` so a chain can be moved into the
/// connect task.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - The server rejected the credential
    /// * `Err(_)` - The credential could not be presented (bad key, transport error)
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, RelayError>;

    /// Strategy name, for logging.
    fn name(&self) -> &'static str;
}
