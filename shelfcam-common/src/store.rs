//! Content store abstraction
//!
//! Every store the pipeline touches (unsorted runs, batches, experiments, junk)
//! is a directory tree. Components talk to it through [`ContentStore`] so the
//! sorting logic runs unchanged against the real filesystem ([`FsStore`]) and
//! against an in-memory tree in tests ([`MemStore`]).
//!
//! Ownership moves between stores are renames. A rename never replaces an
//! existing entry: the target must be free.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of store entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub modified: SystemTime,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Streaming handle returned by [`ContentStore::open_read`]
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Names starting with `.` (editor checkpoints, `.DS_Store`) are never listed
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Directory-tree store used by every pipeline component
pub trait ContentStore: Send + Sync {
    /// Non-hidden children of `dir`, sorted by name
    fn list(&self, dir: &Path) -> Result<Vec<Entry>>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn create_dir_all(&self, dir: &Path) -> Result<()>;

    /// Move `from` to `to`. Fails with [`Error::AlreadyExists`] if `to` is taken
    /// and [`Error::NotFound`] if `from` or the parent of `to` is missing.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file or a whole directory tree. Missing paths are ignored.
    fn remove_all(&self, path: &Path) -> Result<()>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads
    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>>;

    /// Create or replace a file
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Create or replace a file from `reader`, returning the bytes written.
    /// `modified` stamps the file's modification time; `None` keeps "now".
    fn write_from(
        &self,
        path: &Path,
        reader: &mut dyn Read,
        modified: Option<SystemTime>,
    ) -> Result<u64>;

    /// Like [`ContentStore::list`] but a missing directory lists as empty
    fn list_or_empty(&self, dir: &Path) -> Result<Vec<Entry>> {
        if self.is_dir(dir) {
            self.list(dir)
        } else {
            Ok(Vec::new())
        }
    }

    /// Move `from` into directory `to_dir`, keeping its name
    fn move_into(&self, from: &Path, to_dir: &Path) -> Result<PathBuf> {
        let name = from
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("no file name: {}", from.display())))?;
        let target = to_dir.join(name);
        self.rename(from, &target)?;
        Ok(target)
    }

    /// Number of non-hidden files directly under `dir`
    fn count_files(&self, dir: &Path) -> Result<usize> {
        Ok(self.list(dir)?.iter().filter(|e| e.is_file()).count())
    }
}

// ============================================================================
// Filesystem store
// ============================================================================

/// [`ContentStore`] backed by the real filesystem
#[derive(Debug, Clone, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

fn map_io(err: std::io::Error, path: &Path) -> Error {
    match err.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_path_buf()),
        _ => Error::Io(err),
    }
}

impl ContentStore for FsStore {
    fn list(&self, dir: &Path) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for item in std::fs::read_dir(dir).map_err(|e| map_io(e, dir))? {
            let item = item?;
            let name = item.file_name().to_string_lossy().to_string();
            if is_hidden(&name) {
                continue;
            }
            let metadata = item.metadata()?;
            let kind = if metadata.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(Entry {
                name,
                kind,
                modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| map_io(e, dir))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if !from.exists() {
            return Err(Error::NotFound(from.to_path_buf()));
        }
        if to.exists() {
            return Err(Error::AlreadyExists(to.to_path_buf()));
        }
        std::fs::rename(from, to).map_err(|e| map_io(e, to))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| map_io(e, path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>> {
        let file = std::fs::File::open(path).map_err(|e| map_io(e, path))?;
        Ok(Box::new(std::io::BufReader::new(file)))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        std::fs::write(path, data).map_err(|e| map_io(e, path))
    }

    fn write_from(
        &self,
        path: &Path,
        reader: &mut dyn Read,
        modified: Option<SystemTime>,
    ) -> Result<u64> {
        let mut file = std::fs::File::create(path).map_err(|e| map_io(e, path))?;
        let written = std::io::copy(reader, &mut file)?;
        if let Some(modified) = modified {
            file.set_modified(modified)?;
        }
        Ok(written)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Vec<u8>, modified: SystemTime },
}

/// In-memory [`ContentStore`] for tests and dry runs
///
/// Enforces the same rules as [`FsStore`]: parents must exist, renames never
/// replace, and directories move with all of their descendants.
#[derive(Debug, Default)]
pub struct MemStore {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file with an explicit modification time, creating parents
    pub fn insert_file(&self, path: &Path, data: &[u8], modified: SystemTime) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        let mut nodes = self.lock()?;
        if matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: data.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    /// Every file path currently stored under `root`, sorted
    pub fn files_under(&self, root: &Path) -> Vec<PathBuf> {
        match self.lock() {
            Ok(nodes) => nodes
                .iter()
                .filter(|(p, n)| matches!(n, Node::File { .. }) && p.starts_with(root))
                .map(|(p, _)| p.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }
}

impl ContentStore for MemStore {
    fn list(&self, dir: &Path) -> Result<Vec<Entry>> {
        let nodes = self.lock()?;
        match nodes.get(dir) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => {
                return Err(Error::InvalidInput(format!(
                    "not a directory: {}",
                    dir.display()
                )))
            }
            None => return Err(Error::NotFound(dir.to_path_buf())),
        }

        let entries = nodes
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .filter_map(|(path, node)| {
                let name = path.file_name()?.to_string_lossy().to_string();
                if is_hidden(&name) {
                    return None;
                }
                let (kind, modified) = match node {
                    Node::Dir => (EntryKind::Dir, UNIX_EPOCH),
                    Node::File { modified, .. } => (EntryKind::File, *modified),
                };
                Some(Entry {
                    name,
                    kind,
                    modified,
                })
            })
            .collect();
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().map(|n| n.contains_key(path)).unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.lock()
            .map(|n| matches!(n.get(path), Some(Node::Dir)))
            .unwrap_or(false)
    }

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        let mut nodes = self.lock()?;
        let mut current = PathBuf::new();
        for component in dir.components() {
            current.push(component);
            match nodes.get(&current) {
                Some(Node::Dir) => {}
                Some(Node::File { .. }) => {
                    return Err(Error::AlreadyExists(current));
                }
                None => {
                    nodes.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut nodes = self.lock()?;
        if !nodes.contains_key(from) {
            return Err(Error::NotFound(from.to_path_buf()));
        }
        if nodes.contains_key(to) {
            return Err(Error::AlreadyExists(to.to_path_buf()));
        }
        if to.starts_with(from) {
            return Err(Error::InvalidInput(format!(
                "cannot move {} into itself",
                from.display()
            )));
        }
        match to.parent() {
            Some(parent) if matches!(nodes.get(parent), Some(Node::Dir)) => {}
            Some(parent) => return Err(Error::NotFound(parent.to_path_buf())),
            None => return Err(Error::InvalidInput("cannot replace the root".to_string())),
        }

        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = if old == from {
                    to.to_path_buf()
                } else {
                    match old.strip_prefix(from) {
                        Ok(rest) => to.join(rest),
                        Err(_) => continue,
                    }
                };
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let mut nodes = self.lock()?;
        nodes.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let nodes = self.lock()?;
        match nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir) => Err(Error::InvalidInput(format!(
                "is a directory: {}",
                path.display()
            ))),
            None => Err(Error::NotFound(path.to_path_buf())),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSeek>> {
        Ok(Box::new(std::io::Cursor::new(self.read(path)?)))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.put_file(path, data.to_vec(), SystemTime::now())
    }

    fn write_from(
        &self,
        path: &Path,
        reader: &mut dyn Read,
        modified: Option<SystemTime>,
    ) -> Result<u64> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let written = data.len() as u64;
        self.put_file(path, data, modified.unwrap_or_else(SystemTime::now))?;
        Ok(written)
    }
}

impl MemStore {
    /// Store a file under an existing parent directory
    fn put_file(&self, path: &Path, data: Vec<u8>, modified: SystemTime) -> Result<()> {
        let mut nodes = self.lock()?;
        match path.parent() {
            Some(parent) if matches!(nodes.get(parent), Some(Node::Dir)) => {}
            Some(parent) => return Err(Error::NotFound(parent.to_path_buf())),
            None => return Err(Error::InvalidInput("cannot write the root".to_string())),
        }
        if matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        nodes.insert(path.to_path_buf(), Node::File { data, modified });
        Ok(())
    }
}
