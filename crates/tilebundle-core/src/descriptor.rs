use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::TileSet;

/// On-disk bundle description: `{ "tilesets": [ ... ] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleDescription {
    #[serde(default)]
    pub tilesets: Vec<TileSet>,
}

/// Tile sets parsed from one bundle description, ready to be built.
#[derive(Debug, Clone)]
pub struct ParsedBundle {
    pub tile_sets: Vec<TileSet>,
    /// Directory of the description; image paths are relative to it.
    pub descriptor_dir: PathBuf,
    /// Newest modification time among the description and config files.
    pub newest_source: SystemTime,
}

impl ParsedBundle {
    pub fn new(tile_sets: Vec<TileSet>, descriptor_dir: impl Into<PathBuf>, newest_source: SystemTime) -> Self {
        Self {
            tile_sets,
            descriptor_dir: descriptor_dir.into(),
            newest_source,
        }
    }

    /// Counts another input file (e.g. a build config) towards the bundle's staleness.
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        let modified = fs::metadata(path)?.modified()?;
        self.newest_source = self.newest_source.max(modified);
        Ok(())
    }
}

/// Parses a JSON bundle description.
pub fn load_bundle(path: &Path) -> Result<ParsedBundle> {
    let text = fs::read_to_string(path)?;
    let desc: BundleDescription = serde_json::from_str(&text)?;
    let modified = fs::metadata(path)?.modified()?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(ParsedBundle::new(desc.tilesets, dir, modified))
}
