use super::{DirectoryEntry, Entry, Error, ErrorKind, FileEntry};
use crate::{auth::Identity, auth::AuthenticationError, transfer::TransferCapabilities};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

/// Result type used by file system backends.
pub type Result<T> = std::result::Result<T, Error>;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read, starting at the given byte offset.
    Read {
        /// Offset set by a previous `REST`.
        start_pos: u64,
    },
    /// Overwrite, starting at the given byte offset. Offset 0 truncates.
    Write {
        /// Offset set by a previous `REST`.
        start_pos: u64,
    },
    /// Write at the end of the file.
    Append,
}

/// A stream returned by [`FileSystem::open`].
pub enum FileStream {
    /// Returned for [`OpenMode::Read`].
    Reader(Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>),
    /// Returned for [`OpenMode::Write`] and [`OpenMode::Append`].
    Writer(Box<dyn tokio::io::AsyncWrite + Send + Sync + Unpin>),
}

impl Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStream::Reader(_) => f.write_str("FileStream::Reader"),
            FileStream::Writer(_) => f.write_str("FileStream::Writer"),
        }
    }
}

/// The virtual file system a logged in session works against.
///
/// Paths handed to [`resolve`](FileSystem::resolve) are either absolute (starting with `/`) or
/// relative to the given base directory. Every failure must be returned as an [`Error`] with a
/// fitting [`ErrorKind`]; that is what the client's reply is derived from.
#[async_trait]
pub trait FileSystem: Send + Sync + Debug {
    /// The root directory. Always exists.
    fn root(&self) -> DirectoryEntry;

    /// Looks up `path` relative to `base`.
    async fn resolve(&self, base: &DirectoryEntry, path: &str) -> Result<Entry>;

    /// Opens a file for reading or writing.
    async fn open(&self, entry: &FileEntry, mode: OpenMode) -> Result<FileStream>;

    /// Creates an empty file called `name` in `parent`, or returns the existing one.
    async fn create(&self, parent: &DirectoryEntry, name: &str) -> Result<FileEntry>;

    /// Moves `from` to `name` inside `to_parent`.
    async fn rename(&self, _from: &Entry, _to_parent: &DirectoryEntry, _name: &str) -> Result<Entry> {
        Err(ErrorKind::CommandNotImplemented.into())
    }

    /// The transfer modes this backend can serve.
    fn capabilities(&self) -> TransferCapabilities {
        TransferCapabilities::default()
    }

    /// Checks whether a remembered directory snapshot still refers to the same directory.
    async fn is_current(&self, entry: &DirectoryEntry) -> bool {
        let root = self.root();
        if entry.is_root() {
            return root.id() == entry.id();
        }
        match self.resolve(&root, &entry.path().to_string_lossy()).await {
            Ok(Entry::Directory(found)) => found.id() == entry.id(),
            _ => false,
        }
    }

    /// Releases whatever the backend holds for this session. Called exactly once, after all
    /// transfers through this file system have finished.
    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

/// Hands out a file system for an authenticated identity.
#[async_trait]
pub trait FileSystemProvider: Send + Sync + Debug {
    /// Creates the file system `identity` will work against. Rejecting the identity fails the
    /// login.
    async fn provide(&self, identity: &Identity) -> std::result::Result<Arc<dyn FileSystem>, AuthenticationError>;
}
