use std::path::{Path, PathBuf};

/// Identifies an entry inside a file system at the time it was looked up.
///
/// A backend hands out a new `generation` whenever the entry at `index` is replaced or removed,
/// so comparing ids tells whether a remembered entry is still the one that exists now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryId {
    /// Backend specific slot, e.g. an inode number.
    pub index: u64,
    /// Bumped by the backend each time the slot is reused.
    pub generation: u64,
}

impl EntryId {
    /// Creates a new id.
    pub const fn new(index: u64, generation: u64) -> Self {
        EntryId { index, generation }
    }
}

/// An immutable snapshot of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryEntry {
    path: PathBuf,
    id: EntryId,
}

impl DirectoryEntry {
    /// Creates a snapshot for the directory at the absolute `path`.
    pub fn new<P: Into<PathBuf>>(path: P, id: EntryId) -> Self {
        DirectoryEntry { path: path.into(), id }
    }

    /// The absolute path of the directory within its file system.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last path component, empty for the root.
    pub fn name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// The id the backend reported when the snapshot was taken.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// True if this is the root directory.
    pub fn is_root(&self) -> bool {
        self.path.parent().is_none()
    }
}

/// An immutable snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    path: PathBuf,
    id: EntryId,
    size: u64,
}

impl FileEntry {
    /// Creates a snapshot for the file at the absolute `path`.
    pub fn new<P: Into<PathBuf>>(path: P, id: EntryId, size: u64) -> Self {
        FileEntry { path: path.into(), id, size }
    }

    /// The absolute path of the file within its file system.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name.
    pub fn name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// The id the backend reported when the snapshot was taken.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The size in bytes when the snapshot was taken.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Result of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entry {
    /// The path is a directory.
    Directory(DirectoryEntry),
    /// The path is a file.
    File(FileEntry),
}

impl Entry {
    /// The absolute path of the entry.
    pub fn path(&self) -> &Path {
        match self {
            Entry::Directory(d) => d.path(),
            Entry::File(f) => f.path(),
        }
    }

    /// The id of the entry.
    pub fn id(&self) -> EntryId {
        match self {
            Entry::Directory(d) => d.id(),
            Entry::File(f) => f.id(),
        }
    }

    /// True for directories.
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    /// Returns the directory, if this is one.
    pub fn into_directory(self) -> Option<DirectoryEntry> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    /// Returns the file, if this is one.
    pub fn into_file(self) -> Option<FileEntry> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Directory(_) => None,
        }
    }
}

impl From<DirectoryEntry> for Entry {
    fn from(dir: DirectoryEntry) -> Self {
        Entry::Directory(dir)
    }
}

impl From<FileEntry> for Entry {
    fn from(file: FileEntry) -> Self {
        Entry::File(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_name() {
        let root = DirectoryEntry::new("/", EntryId::new(1, 0));
        assert!(root.is_root());
        assert_eq!(root.name(), "");

        let pub_dir = DirectoryEntry::new("/pub", EntryId::new(2, 0));
        assert!(!pub_dir.is_root());
        assert_eq!(pub_dir.name(), "pub");
    }

    #[test]
    fn entry_conversions() {
        let file: Entry = FileEntry::new("/pub/file.bin", EntryId::new(3, 1), 10).into();
        assert!(!file.is_dir());
        assert_eq!(file.id(), EntryId::new(3, 1));
        assert!(file.clone().into_directory().is_none());
        assert_eq!(file.into_file().map(|f| f.size()), Some(10));
    }
}
