//! Contains the [`Authenticator`] trait and the [`Identity`] it produces.
//!
//! ```no_run
//! use ftpcore_api::auth::{AuthenticationError, Authenticator, Credentials, Identity};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct SingleUser;
//!
//! #[async_trait]
//! impl Authenticator for SingleUser {
//!     async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<Identity, AuthenticationError> {
//!         match (username, creds.password.as_deref()) {
//!             ("alice", Some("secret")) => Ok(Identity::new(username)),
//!             ("alice", _) => Err(AuthenticationError::BadPassword),
//!             _ => Err(AuthenticationError::BadUser),
//!         }
//!     }
//! }
//! ```

mod authenticator;
pub use authenticator::{AuthenticationError, Authenticator, Credentials, Identity};
