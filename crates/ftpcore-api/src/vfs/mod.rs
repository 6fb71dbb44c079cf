//! Contains the [`FileSystem`] trait a session navigates and transfers through.
//!
//! To create a new backend:
//!
//! 1. Declare dependencies on the async-trait, tokio, and ftpcore-api crates:
//!
//! ```toml
//! async-trait = "0.1.89"
//! tokio = { version = "1.49.0", features = ["io-util"] }
//! ftpcore-api = { path = "../path/to/ftpcore-api" }
//! ```
//!
//! 2. Implement the [`FileSystem`] trait, classifying every failure into an [`ErrorKind`]:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use ftpcore_api::vfs::{
//!     DirectoryEntry, Entry, EntryId, ErrorKind, FileEntry, FileStream, FileSystem, OpenMode, Result,
//! };
//!
//! #[derive(Debug)]
//! pub struct EmptyFs;
//!
//! #[async_trait]
//! impl FileSystem for EmptyFs {
//!     fn root(&self) -> DirectoryEntry {
//!         DirectoryEntry::new("/", EntryId::new(0, 0))
//!     }
//!
//!     async fn resolve(&self, _base: &DirectoryEntry, _path: &str) -> Result<Entry> {
//!         Err(ErrorKind::NotFound.into())
//!     }
//!
//!     async fn open(&self, _entry: &FileEntry, _mode: OpenMode) -> Result<FileStream> {
//!         Err(ErrorKind::NotFound.into())
//!     }
//!
//!     async fn create(&self, _parent: &DirectoryEntry, _name: &str) -> Result<FileEntry> {
//!         Err(ErrorKind::PermissionDenied.into())
//!     }
//! }
//! ```
//!
//! 3. Implement [`FileSystemProvider`] to hand one out per logged in user.

mod entry;
pub use entry::{DirectoryEntry, Entry, EntryId, FileEntry};

mod error;
pub use error::{Error, ErrorKind};

mod file_system;
pub use file_system::{FileStream, FileSystem, FileSystemProvider, OpenMode, Result};
