use crate::BoxError;
use async_trait::async_trait;
use std::fmt::{self, Debug, Display};
use thiserror::Error;

/// Defines the requirements for authentication providers.
#[async_trait]
pub trait Authenticator: Sync + Send + Debug {
    /// Authenticate the given user with the given credentials.
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<Identity, AuthenticationError>;
}

/// The identity a session logs in as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// The name the user logged in with.
    pub username: String,
    /// True for anonymous logins.
    pub anonymous: bool,
}

impl Identity {
    /// A named, non-anonymous identity.
    pub fn new<S: Into<String>>(username: S) -> Self {
        Identity {
            username: username.into(),
            anonymous: false,
        }
    }

    /// An anonymous identity, keeping the name the client gave.
    pub fn anonymous<S: Into<String>>(username: S) -> Self {
        Identity {
            username: username.into(),
            anonymous: true,
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.anonymous {
            write!(f, "{} (anonymous)", self.username)
        } else {
            f.write_str(&self.username)
        }
    }
}

/// The credentials a client presented.
#[derive(Clone, Default)]
pub struct Credentials {
    /// The password given with `PASS`, if any.
    pub password: Option<String>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("password", &self.password.as_ref().map(|_| "***")).finish()
    }
}

impl From<&str> for Credentials {
    fn from(s: &str) -> Self {
        Credentials {
            password: Some(s.to_string()),
        }
    }
}

/// The error type for authentication failures.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    /// The password did not match.
    #[error("bad password")]
    BadPassword,
    /// The user is unknown.
    #[error("bad username")]
    BadUser,
    /// The provider refused the identity, e.g. because no file system could be set up for it.
    #[error("rejected by provider: {0}")]
    Rejected(String),
    /// Another error originating from the provider implementation.
    #[error("authentication provider error: {0}")]
    ImplPropagated(String, #[source] Option<BoxError>),
}

impl AuthenticationError {
    /// Wraps an arbitrary provider error.
    pub fn new<E>(error: E) -> AuthenticationError
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let source = error.into();
        AuthenticationError::ImplPropagated(source.to_string(), Some(source))
    }
}
