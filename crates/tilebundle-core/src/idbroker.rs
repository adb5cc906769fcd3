use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BundleError, Result};

/// Maps tile set names to stable integer ids.
pub trait TileSetIdBroker {
    /// Id for `name`, assigning a fresh one if the name is new.
    fn tile_set_id(&mut self, name: &str) -> Result<u32>;
    fn is_mapped(&self, name: &str) -> bool;
    /// Persist any newly assigned ids.
    fn commit(&mut self) -> Result<()>;
}

/// Ids live only as long as the broker; consistent within one run.
#[derive(Debug, Default, Clone)]
pub struct MemoryIdBroker {
    ids: BTreeMap<String, u32>,
    next_id: u32,
}

impl MemoryIdBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileSetIdBroker for MemoryIdBroker {
    fn tile_set_id(&mut self, name: &str) -> Result<u32> {
        if let Some(id) = self.ids.get(name) {
            return Ok(*id);
        }
        self.next_id += 1;
        self.ids.insert(name.to_string(), self.next_id);
        Ok(self.next_id)
    }

    fn is_mapped(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdTable {
    next_id: u32,
    ids: BTreeMap<String, u32>,
}

/// Broker persisted as a JSON file; ids survive across builds.
#[derive(Debug)]
pub struct FileIdBroker {
    path: PathBuf,
    table: IdTable,
    dirty: bool,
}

impl FileIdBroker {
    /// Loads `path`, or starts empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let table: IdTable = serde_json::from_str(&text)?;
            let max_id = table.ids.values().copied().max().unwrap_or(0);
            if table.next_id < max_id {
                return Err(BundleError::InvalidInput(format!(
                    "id table {} has next_id {} below assigned id {}",
                    path.display(),
                    table.next_id,
                    max_id
                )));
            }
            table
        } else {
            IdTable::default()
        };
        Ok(Self {
            path,
            table,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.table.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.ids.is_empty()
    }
}

impl TileSetIdBroker for FileIdBroker {
    fn tile_set_id(&mut self, name: &str) -> Result<u32> {
        if let Some(id) = self.table.ids.get(name) {
            return Ok(*id);
        }
        let id = self.table.next_id.checked_add(1).ok_or_else(|| BundleError::IdAssignment {
            name: name.to_string(),
            reason: "tile set id space exhausted".into(),
        })?;
        self.table.next_id = id;
        self.table.ids.insert(name.to_string(), id);
        self.dirty = true;
        debug!(name, id, "assigned tile set id");
        Ok(id)
    }

    fn is_mapped(&self, name: &str) -> bool {
        self.table.ids.contains_key(name)
    }

    fn commit(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.table)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        self.dirty = false;
        Ok(())
    }
}
