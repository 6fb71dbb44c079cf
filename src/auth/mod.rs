//! Contains the [`Authenticator`] trait, the [`Identity`] it yields and the
//! [`AuthenticationPipeline`] that logs a [`Session`](crate::server::Session) in with it.
//!
//! Implement [`Authenticator`] to check credentials and
//! [`FileSystemProvider`](crate::vfs::FileSystemProvider) to hand out a file system per identity:
//!
//! ```no_run
//! use libftpcore::auth::{AnonymousAuthenticator, AuthenticationPipeline};
//! # use libftpcore::vfs::FileSystemProvider;
//! # use std::sync::Arc;
//! # fn demo(provider: Arc<dyn FileSystemProvider>) {
//! let pipeline = AuthenticationPipeline::new(Arc::new(AnonymousAuthenticator), provider);
//! # }
//! ```

pub mod anonymous;
pub use anonymous::AnonymousAuthenticator;

pub use ftpcore_api::auth::{AuthenticationError, Authenticator, Credentials, Identity};

mod pipeline;
pub use pipeline::AuthenticationPipeline;
