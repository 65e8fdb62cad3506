//! "none" SSH authentication, for hosts that admit a user without credentials.

use async_trait::async_trait;
use russh::client;

use crate::relay::error::RelayError;
use crate::relay::session::SshClientHandler;

use super::traits::AuthStrategy;

pub struct NoneAuth;

#[async_trait]
impl AuthStrategy for NoneAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, RelayError> {
        let result = handle
            .authenticate_none(username)
            .await
            .map_err(|e| RelayError::AuthFailed(format!("none authentication failed: {}", e)))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
