//! Authentication strategies for relay connections.
//!
//! Each credential a client supplies becomes one [`AuthStrategy`]; an
//! [`AuthChain`] tries them in order until one succeeds.
//!
//! # Available Strategies
//!
//! - [`KeyAuth`]: PEM private key sent with the connect request
//! - [`PasswordAuth`]: password authentication
//! - [`NoneAuth`]: no credentials at all
//!
//! # Example
//!
//! ```ignore
//! use ssh_relay::relay::auth::{AuthChain, AuthStrategy};
//!
//! let chain = AuthChain::new()
//!     .with_key(pem, None)
//!     .with_password("secret");
//!
//! let ok = chain.authenticate(&mut handle, "username").await?;
//! ```

mod chain;
mod key;
mod none;
mod password;
mod traits;

pub use chain::AuthChain;
pub use key::KeyAuth;
pub use none::NoneAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
