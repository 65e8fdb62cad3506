//! Private key SSH authentication from in-memory PEM text.

use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::relay::error::RelayError;
use crate::relay::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Public key authentication with a key supplied by the client.
///
/// The key never touches disk. Encrypted keys need `passphrase`.
pub struct KeyAuth {
    pem: String,
    passphrase: Option<String>,
}

impl KeyAuth {
    pub fn new(pem: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            pem: pem.into(),
            passphrase,
        }
    }

    fn decode(&self) -> Result<keys::PrivateKey, RelayError> {
        keys::decode_secret_key(&self.pem, self.passphrase.as_deref())
            .map_err(|e| RelayError::AuthFailed(format!("invalid private key: {}", e)))
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, RelayError> {
        let key_pair = self.decode()?;

        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| RelayError::AuthFailed(format!("key authentication failed: {}", e)))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
