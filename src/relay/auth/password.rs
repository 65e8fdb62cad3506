//! Password-based SSH authentication.

use async_trait::async_trait;
use russh::client;

use crate::relay::error::RelayError;
use crate::relay::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Password authentication strategy.
pub struct PasswordAuth {
    password: String,
}

impl PasswordAuth {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, RelayError> {
        let result = handle
            .authenticate_password(username, &self.password)
            .await
            .map_err(|e| RelayError::AuthFailed(format!("password authentication failed: {}", e)))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
