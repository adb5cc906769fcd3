//! Core library for building 2D tile set bundles.
//!
//! - Trimming: object tile sets are cut to the opaque bounds of each sprite and
//!   repacked into a fresh atlas, with origins and footprints adjusted to match
//! - Packing: pluggable [`Packer`] strategies; [`StripPacker`] fills fixed-width rows
//! - Pipeline: [`TileSetBundler`] turns a bundle description into images plus a
//!   manifest inside a [`BundleWriter`], skipping work whose output is up to date
//!
//! Quick example:
//! ```ignore
//! use std::path::Path;
//! use tilebundle_core::prelude::*;
//! # fn main() -> anyhow::Result<()> {
//! let bundler = TileSetBundler::new(BuildConfig::default());
//! let mut ids = FileIdBroker::open("tilesets.ids.json")?;
//! let writer = DirBundleWriter::new("out/items")?;
//! let report = bundler.create(Path::new("items.bundle.json"), &mut ids, writer)?;
//! println!("trimmed: {}", report.count(ItemStatus::Trimmed));
//! # Ok(()) }
//! ```

pub mod archive;
pub mod bounds;
pub mod codec;
pub mod compositing;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod idbroker;
pub mod metadata;
pub mod metrics;
pub mod model;
pub mod packer;
pub mod pipeline;
pub mod pixels;
pub mod trimmer;

pub use archive::{BundleWriter, DirBundleWriter, EntrySink, MemoryBundleWriter, start_new_file};
pub use bounds::BoundsScanner;
pub use codec::ImageFormat;
pub use config::*;
pub use descriptor::{BundleDescription, ParsedBundle, load_bundle};
pub use error::*;
pub use idbroker::{FileIdBroker, MemoryIdBroker, TileSetIdBroker};
pub use metrics::{MetricsAdjuster, trim_object_tile_set};
pub use model::*;
pub use packer::*;
pub use pipeline::*;
pub use pixels::PixelSource;
pub use trimmer::{TrimmedAtlas, Trimmer};

/// Convenience prelude for common types and functions.
/// Importing `tilebundle_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::archive::{BundleWriter, DirBundleWriter, MemoryBundleWriter};
    pub use crate::config::{BuildConfig, BuildConfigBuilder, MetadataFormat};
    pub use crate::descriptor::{ParsedBundle, load_bundle};
    pub use crate::error::{BundleError, Result};
    pub use crate::idbroker::{FileIdBroker, MemoryIdBroker, TileSetIdBroker};
    pub use crate::model::{
        BundleManifest, BundleTileSet, CellLayout, Rect, Sprite, TileSet, TileSetKind,
        TrimResult, TrimStats, TrimmedTileSet,
    };
    pub use crate::packer::{PackInput, PackLayout, Packer, StripPacker};
    pub use crate::pipeline::{BuildReport, BundleJob, ItemStatus, TileSetBundler};
    pub use crate::trimmer::{TrimmedAtlas, Trimmer};
}
