use std::path::PathBuf;

use thiserror::Error;

use crate::model::Rect;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Pixel ({x}, {y}) is outside the {width}x{height} cell")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    #[error("Cell {index} at {cell:?} does not fit in the {width}x{height} image")]
    CellOutOfBounds {
        index: usize,
        cell: Rect,
        width: u32,
        height: u32,
    },
    #[error("Packing failed: {0}")]
    Pack(String),
    #[error("Tile set '{name}' is missing its image file {}", path.display())]
    MissingImage { name: String, path: PathBuf },
    #[error("Tile set with image '{image_path}' has no name")]
    UnnamedTileSet { image_path: String },
    #[error("Failed to assign an id to tile set '{name}': {reason}")]
    IdAssignment { name: String, reason: String },
    #[error("Failed to decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to trim tile set '{tile_set}': {source}")]
    Trim {
        tile_set: String,
        #[source]
        source: Box<BundleError>,
    },
    #[error("Failed to write bundle entry '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write bundle metadata '{path}': {source}")]
    MetadataWrite {
        path: String,
        #[source]
        source: Box<BundleError>,
    },
    #[error("Malformed bundle metadata: {0}")]
    Metadata(String),
    #[error("Failed to finalize bundle: {0}")]
    ArchiveFinalize(String),
    #[error("Failed to create bundle {target}: {source}")]
    BuildFailed {
        target: String,
        #[source]
        source: Box<BundleError>,
    },
}

pub type Result<T> = std::result::Result<T, BundleError>;
