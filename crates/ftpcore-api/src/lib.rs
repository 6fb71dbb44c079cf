//! Capability traits and types consumed by the libftpcore session core.
//!
//! Backends implement [`vfs::FileSystem`] and [`vfs::FileSystemProvider`], and authentication
//! providers implement [`auth::Authenticator`]. The protocol layer never sees anything but the
//! types defined here.

pub mod auth;
pub mod transfer;
pub mod vfs;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
