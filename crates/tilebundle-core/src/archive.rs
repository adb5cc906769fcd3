//! Bundle output stores.
//!
//! The build pipeline only needs a key -> bytes store that can answer timestamp queries,
//! commit once, or roll back once. [`BundleWriter`] is that seam; `close` and `delete`
//! consume the writer, so each can run at most once per build.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BundleError, Result};

pub trait BundleWriter: Send + Sync {
    /// Where the bundle lives, for logs and error messages.
    fn location(&self) -> String;

    /// Stores `bytes` under `path`. Entries are either fully written or absent.
    /// Writes to distinct paths may run concurrently.
    fn put_entry(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    /// Modification time of the entry at `path`, if present.
    fn entry_modified(&self, path: &str) -> Option<SystemTime>;

    fn is_path_newer_than(&self, path: &str, time: SystemTime) -> bool {
        self.entry_modified(path).is_some_and(|m| m > time)
    }

    /// True when the bundle as a whole is newer than `time`.
    fn is_newer_than(&self, time: SystemTime) -> bool;

    /// Commit the bundle.
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Remove the in-progress bundle. Returns false if anything was left behind.
    fn delete(self) -> bool
    where
        Self: Sized;
}

/// Streaming handle for one entry; nothing is stored until [`EntrySink::commit`].
pub struct EntrySink<'a> {
    writer: &'a dyn BundleWriter,
    path: String,
    buf: Vec<u8>,
}

impl<'a> EntrySink<'a> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn commit(self) -> io::Result<()> {
        self.writer.put_entry(&self.path, &self.buf)
    }
}

impl Write for EntrySink<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn start_new_file<'a>(writer: &'a dyn BundleWriter, path: &str) -> EntrySink<'a> {
    EntrySink {
        writer,
        path: path.to_string(),
        buf: Vec::new(),
    }
}

/// Bundle stored as a directory tree; every entry is a file.
pub struct DirBundleWriter {
    root: PathBuf,
    written: AtomicUsize,
}

impl DirBundleWriter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            written: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, path: &str) -> io::Result<PathBuf> {
        let rel = Path::new(path);
        let plain = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bundle entry path must be relative and plain: '{path}'"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl BundleWriter for DirBundleWriter {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn put_entry(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let dest = self.entry_path(path)?;
        let parent = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        // temp file + rename keeps half-written entries invisible
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        self.written.fetch_add(1, Ordering::Relaxed);
        debug!(path, bytes = bytes.len(), "wrote bundle entry");
        Ok(())
    }

    fn entry_modified(&self, path: &str) -> Option<SystemTime> {
        let full = self.entry_path(path).ok()?;
        fs::metadata(full).and_then(|m| m.modified()).ok()
    }

    fn is_newer_than(&self, time: SystemTime) -> bool {
        let mut oldest: Option<SystemTime> = None;
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(modified) = entry.metadata().map_err(io::Error::from).and_then(|m| m.modified())
            else {
                return false;
            };
            oldest = Some(oldest.map_or(modified, |o| o.min(modified)));
        }
        oldest.is_some_and(|o| o > time)
    }

    fn close(self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(BundleError::ArchiveFinalize(format!(
                "bundle directory {} vanished before close",
                self.root.display()
            )));
        }
        info!(
            root = %self.root.display(),
            entries = self.written.load(Ordering::Relaxed),
            "bundle closed"
        );
        Ok(())
    }

    fn delete(self) -> bool {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "failed to remove bundle");
                false
            }
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    entries: BTreeMap<String, (Vec<u8>, SystemTime)>,
    closed: bool,
    deleted: bool,
}

/// In-memory bundle. Clones share the same store, so a clone kept by the caller can
/// inspect the result after the pipeline consumed the writer.
#[derive(Clone, Default)]
pub struct MemoryBundleWriter {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryBundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entry(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().entries.get(path).map(|(b, _)| b.clone())
    }

    pub fn entry_paths(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Path -> bytes of every entry.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock()
            .entries
            .iter()
            .map(|(k, (b, _))| (k.clone(), b.clone()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_deleted(&self) -> bool {
        self.lock().deleted
    }
}

impl BundleWriter for MemoryBundleWriter {
    fn location(&self) -> String {
        "<memory>".into()
    }

    fn put_entry(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.lock()
            .entries
            .insert(path.to_string(), (bytes.to_vec(), SystemTime::now()));
        Ok(())
    }

    fn entry_modified(&self, path: &str) -> Option<SystemTime> {
        self.lock().entries.get(path).map(|(_, t)| *t)
    }

    fn is_newer_than(&self, time: SystemTime) -> bool {
        let store = self.lock();
        !store.entries.is_empty() && store.entries.values().all(|(_, t)| *t > time)
    }

    fn close(self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn delete(self) -> bool {
        let mut store = self.lock();
        store.entries.clear();
        store.deleted = true;
        true
    }
}
