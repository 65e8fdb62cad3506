//! Authentication chain for trying multiple strategies.

use async_trait::async_trait;
use russh::client;
use tracing::debug;

use crate::relay::error::RelayError;
use crate::relay::session::SshClientHandler;
use crate::relay::types::Credential;

use super::traits::AuthStrategy;
use super::{KeyAuth, NoneAuth, PasswordAuth};

/// Authentication chain that tries multiple strategies in order.
///
/// The first successful strategy stops the chain. A strategy that errors
/// (an undecodable key, say) does not stop it; the next one is tried.
///
/// # Example
///
/// ```ignore
/// let chain = AuthChain::new()
///     .with_key(pem, Some(passphrase))
///     .with_password("secret");
///
/// let ok = chain.authenticate(&mut handle, "username").await?;
/// ```
pub struct AuthChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Build the chain for a set of client credentials, in the order given.
    ///
    /// An empty credential list yields a chain with only "none" authentication.
    pub fn from_credentials(credentials: &[Credential]) -> Self {
        let mut chain = credentials
            .iter()
            .fold(AuthChain::new(), |chain, credential| match credential {
                Credential::PrivateKey { pem, passphrase } => {
                    chain.with_key(pem.clone(), passphrase.clone())
                }
                Credential::Password(password) => chain.with_password(password.clone()),
            });

        if chain.is_empty() {
            chain = chain.with_none();
        }

        chain
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.strategies.push(Box::new(PasswordAuth::new(password)));
        self
    }

    pub fn with_key(mut self, pem: impl Into<String>, passphrase: Option<String>) -> Self {
        self.strategies.push(Box::new(KeyAuth::new(pem, passphrase)));
        self
    }

    pub fn with_none(mut self) -> Self {
        self.strategies.push(Box::new(NoneAuth));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[cfg(test)]
    fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for AuthChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, RelayError> {
        if self.strategies.is_empty() {
            return Err(RelayError::AuthFailed(
                "no authentication strategies configured".to_string(),
            ));
        }

        let mut last_error = None;

        for strategy in &self.strategies {
            debug!("Trying authentication strategy: {}", strategy.name());

            match strategy.authenticate(handle, username).await {
                Ok(true) => {
                    debug!("Authentication succeeded with strategy: {}", strategy.name());
                    return Ok(true);
                }
                Ok(false) => {
                    debug!("Authentication rejected for strategy: {}", strategy.name());
                    last_error = Some(RelayError::AuthFailed(format!(
                        "{} authentication rejected",
                        strategy.name()
                    )));
                }
                Err(e) => {
                    debug!("Authentication error with strategy {}: {}", strategy.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RelayError::AuthFailed("all authentication methods failed".to_string())
        }))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
