//! Contains the [`DirectoryStack`] that tracks a session's working directory.

use crate::vfs::{self, DirectoryEntry, Entry, ErrorKind, FileSystem};
use std::path::PathBuf;

/// The directories walked from the root down to the working directory. Empty means the session
/// is at the root.
///
/// Every entry was checked to exist when it was pushed. Later removals are not tracked; use
/// [`FileSystem::is_current`] to find out whether the snapshot on top is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryStack {
    entries: Vec<DirectoryEntry>,
}

impl DirectoryStack {
    /// An empty stack, i.e. at the root.
    pub fn new() -> Self {
        DirectoryStack::default()
    }

    /// Enters `entry`.
    pub fn push(&mut self, entry: DirectoryEntry) {
        self.entries.push(entry);
    }

    /// Leaves the current directory. A no-op returning `None` at the root.
    pub fn pop(&mut self) -> Option<DirectoryEntry> {
        self.entries.pop()
    }

    /// The working directory: `root` if the stack is empty, the top entry otherwise.
    pub fn current<'a>(&'a self, root: &'a DirectoryEntry) -> &'a DirectoryEntry {
        self.entries.last().unwrap_or(root)
    }

    /// True at the root.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of directories below the root.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Goes back to the root.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The working directory as shown by `PWD`.
    pub fn path(&self) -> PathBuf {
        let mut path = PathBuf::from("/");
        for entry in &self.entries {
            path.push(entry.name());
        }
        path
    }

    /// Walks `path` from the current position and returns the resulting stack. `self` is left
    /// untouched, so a failed walk never leaves the session half way.
    ///
    /// A leading `/` starts at the root, `.` stays and `..` goes up (staying at the root when
    /// already there). Every other segment must resolve to a directory.
    pub async fn walk(&self, fs: &dyn FileSystem, path: &str) -> vfs::Result<DirectoryStack> {
        let mut walked = self.clone();
        if path.starts_with('/') {
            walked.clear();
        }
        let root = fs.root();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    walked.pop();
                }
                name => {
                    let base = walked.current(&root).clone();
                    match fs.resolve(&base, name).await? {
                        Entry::Directory(dir) => walked.push(dir),
                        Entry::File(_) => return Err(ErrorKind::NotADirectory.into()),
                    }
                }
            }
        }
        Ok(walked)
    }
}
