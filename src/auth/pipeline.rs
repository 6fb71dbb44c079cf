//! Authentication pipeline that combines authentication and file system lookup.

use super::{AuthenticationError, Authenticator, Credentials};
use crate::{server::Session, vfs::FileSystemProvider};
use std::{fmt::Debug, sync::Arc};

/// Combines an [`Authenticator`] and a [`FileSystemProvider`] into the complete login flow:
///
/// 1. Authenticate the user (returns an `Identity`)
/// 2. Get the identity's file system and bind it to the session
#[derive(Debug, Clone)]
pub struct AuthenticationPipeline {
    authenticator: Arc<dyn Authenticator>,
    provider: Arc<dyn FileSystemProvider>,
}

impl AuthenticationPipeline {
    /// Creates a new `AuthenticationPipeline` combining the given authenticator and provider.
    pub fn new(authenticator: Arc<dyn Authenticator>, provider: Arc<dyn FileSystemProvider>) -> Self {
        Self { authenticator, provider }
    }

    /// Checks the credentials and logs `session` in.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError` if authentication fails or if the provider rejects the
    /// identity. The session is unchanged in both cases.
    pub async fn login(&self, session: &mut Session, username: &str, creds: &Credentials) -> Result<(), AuthenticationError> {
        let identity = match self.authenticator.authenticate(username, creds).await {
            Ok(identity) => identity,
            Err(e) => {
                slog::warn!(session.logger(), "Authentication failed"; "username" => username, "error" => %e);
                return Err(e);
            }
        };
        session.login(identity, self.provider.as_ref()).await
    }
}
