//! This module provides an anonymous authenticator

use crate::auth::*;
use async_trait::async_trait;

///
/// [`Authenticator`](crate::auth::Authenticator) implementation that lets everyone in as an
/// anonymous identity, keeping the name the client gave.
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use libftpcore::auth::{Authenticator, AnonymousAuthenticator, Identity};
///
/// let my_auth = AnonymousAuthenticator;
/// assert_eq!(my_auth.authenticate("Finn", &"I ❤️ PB".into()).await.unwrap(), Identity::anonymous("Finn"));
/// # }
/// ```
///
#[derive(Debug)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    #[tracing_attributes::instrument]
    async fn authenticate(&self, username: &str, _password: &Credentials) -> Result<Identity, AuthenticationError> {
        Ok(Identity::anonymous(username))
    }
}
