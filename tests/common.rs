#![allow(dead_code, missing_docs)]

use async_trait::async_trait;
use libftpcore::{
    auth::{AuthenticationError, Identity},
    options::SessionOptions,
    server::{ConnectionContext, Session},
    vfs::{self, DirectoryEntry, Entry, EntryId, ErrorKind, FileEntry, FileStream, FileSystem, FileSystemProvider, OpenMode},
};
use std::{
    collections::HashMap,
    io,
    path::{Component, Path, PathBuf},
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::AsyncWrite;

pub fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub fn session() -> Session {
    let ctx = ConnectionContext {
        peer: "127.0.0.1:40000".parse().unwrap(),
        local: "127.0.0.1:21".parse().unwrap(),
    };
    Session::new(ctx, &SessionOptions::default(), logger())
}

#[derive(Debug, Default)]
struct Tree {
    dirs: HashMap<PathBuf, EntryId>,
    files: HashMap<PathBuf, (EntryId, Vec<u8>)>,
    next_index: u64,
}

impl Tree {
    fn next_id(&mut self) -> EntryId {
        self.next_index += 1;
        EntryId::new(self.next_index, 0)
    }
}

/// An in-memory file system.
#[derive(Debug)]
pub struct MemFs {
    tree: Arc<Mutex<Tree>>,
    writers_closed: Arc<AtomicUsize>,
    disposed: AtomicUsize,
}

impl MemFs {
    pub fn new(dirs: &[&str]) -> Self {
        let mut tree = Tree::default();
        tree.dirs.insert(PathBuf::from("/"), EntryId::new(0, 0));
        for dir in dirs {
            let id = tree.next_id();
            tree.dirs.insert(PathBuf::from(dir), id);
        }
        MemFs {
            tree: Arc::new(Mutex::new(tree)),
            writers_closed: Arc::new(AtomicUsize::new(0)),
            disposed: AtomicUsize::new(0),
        }
    }

    pub fn put(&self, path: &str, content: &[u8]) {
        let mut tree = self.tree.lock().unwrap();
        let id = tree.next_id();
        tree.files.insert(PathBuf::from(path), (id, content.to_vec()));
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.lock().unwrap().files.get(Path::new(path)).map(|(_, data)| data.clone())
    }

    pub fn writers_closed(&self) -> usize {
        self.writers_closed.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Waits until `path` holds at least `len` bytes.
    pub async fn wait_for_len(&self, path: &str, len: usize) {
        for _ in 0..500 {
            if self.content(path).is_some_and(|c| c.len() >= len) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached {} bytes", path, len);
    }
}

fn normalize(base: &Path, path: &str) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in base.join(path).components() {
        match component {
            Component::Normal(name) => out.push(name),
            Component::ParentDir => {
                out.pop();
            }
            _ => {}
        }
    }
    out
}

#[async_trait]
impl FileSystem for MemFs {
    fn root(&self) -> DirectoryEntry {
        DirectoryEntry::new("/", EntryId::new(0, 0))
    }

    async fn resolve(&self, base: &DirectoryEntry, path: &str) -> vfs::Result<Entry> {
        let full = normalize(base.path(), path);
        let tree = self.tree.lock().unwrap();
        if let Some(id) = tree.dirs.get(&full) {
            return Ok(DirectoryEntry::new(full, *id).into());
        }
        match tree.files.get(&full) {
            Some((id, data)) => Ok(FileEntry::new(full, *id, data.len() as u64).into()),
            None => Err(ErrorKind::NotFound.into()),
        }
    }

    async fn open(&self, entry: &FileEntry, mode: OpenMode) -> vfs::Result<FileStream> {
        let tree = self.tree.lock().unwrap();
        let (_, data) = tree.files.get(entry.path()).ok_or_else(|| vfs::Error::from(ErrorKind::NotFound))?;
        match mode {
            OpenMode::Read { start_pos } => {
                let start = (start_pos as usize).min(data.len());
                Ok(FileStream::Reader(Box::new(io::Cursor::new(data[start..].to_vec()))))
            }
            OpenMode::Write { start_pos } => Ok(FileStream::Writer(Box::new(MemWriter {
                tree: self.tree.clone(),
                path: entry.path().to_path_buf(),
                pos: start_pos as usize,
                truncate: start_pos == 0,
                closed: self.writers_closed.clone(),
            }))),
            OpenMode::Append => Ok(FileStream::Writer(Box::new(MemWriter {
                tree: self.tree.clone(),
                path: entry.path().to_path_buf(),
                pos: data.len(),
                truncate: false,
                closed: self.writers_closed.clone(),
            }))),
        }
    }

    async fn create(&self, parent: &DirectoryEntry, name: &str) -> vfs::Result<FileEntry> {
        let path = parent.path().join(name);
        let mut tree = self.tree.lock().unwrap();
        if tree.dirs.contains_key(&path) {
            return Err(ErrorKind::AlreadyExists.into());
        }
        if let Some((id, data)) = tree.files.get(&path) {
            return Ok(FileEntry::new(path, *id, data.len() as u64));
        }
        let id = tree.next_id();
        tree.files.insert(path.clone(), (id, Vec::new()));
        Ok(FileEntry::new(path, id, 0))
    }

    async fn dispose(&self) -> vfs::Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemWriter {
    tree: Arc<Mutex<Tree>>,
    path: PathBuf,
    pos: usize,
    truncate: bool,
    closed: Arc<AtomicUsize>,
}

impl AsyncWrite for MemWriter {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let mut tree = this.tree.lock().unwrap();
        let Some((_, data)) = tree.files.get_mut(&this.path) else {
            return Poll::Ready(Err(io::ErrorKind::NotFound.into()));
        };
        if this.truncate {
            data.clear();
            this.truncate = false;
        }
        let end = this.pos + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[this.pos..end].copy_from_slice(buf);
        this.pos = end;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Hands every identity the same [`MemFs`].
#[derive(Debug)]
pub struct MemProvider(pub Arc<MemFs>);

#[async_trait]
impl FileSystemProvider for MemProvider {
    async fn provide(&self, _identity: &Identity) -> Result<Arc<dyn FileSystem>, AuthenticationError> {
        Ok(self.0.clone())
    }
}
