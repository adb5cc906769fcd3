use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::ImageFormat;
use crate::packer::{Packer, StripPacker};

/// Fixed path of the binary manifest inside a bundle.
pub const METADATA_PATH: &str = "tsbundle.dat";
/// Fixed path of the JSON manifest inside a bundle.
pub const METADATA_JSON_PATH: &str = "tsbundles.json";

/// Encoding of the bundle manifest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFormat {
    /// Compact binary form.
    #[default]
    Binary,
    /// Structured, human-readable JSON.
    Json,
}

impl MetadataFormat {
    pub fn path(&self) -> &'static str {
        match self {
            MetadataFormat::Binary => METADATA_PATH,
            MetadataFormat::Json => METADATA_JSON_PATH,
        }
    }
}

impl FromStr for MetadataFormat {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "bin" | "dat" => Ok(Self::Binary),
            "json" | "text" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Options for one bundle build. Built up front and never mutated during the build.
#[derive(Clone)]
pub struct BuildConfig {
    /// Trim object tile sets into packed atlases.
    pub trim_images: bool,
    /// Write images in the fast raw format when they convert losslessly.
    pub use_raw_images: bool,
    /// Strategy used to lay out trimmed sprites.
    pub packer: Arc<dyn Packer>,
    pub metadata_format: MetadataFormat,
    /// Directory tile set image paths are resolved against; defaults to the
    /// bundle description's directory.
    pub image_base: Option<PathBuf>,
    /// Process tile sets on the rayon pool when the `parallel` feature is on.
    pub parallel: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            trim_images: true,
            use_raw_images: true,
            packer: Arc::new(StripPacker::default()),
            metadata_format: MetadataFormat::default(),
            image_base: None,
            parallel: false,
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("trim_images", &self.trim_images)
            .field("use_raw_images", &self.use_raw_images)
            .field("packer", &self.packer)
            .field("metadata_format", &self.metadata_format)
            .field("image_base", &self.image_base)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl BuildConfig {
    /// Create a fluent builder for `BuildConfig`.
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::new()
    }

    /// Encoding used for images written into the bundle.
    pub fn image_format(&self) -> ImageFormat {
        if self.use_raw_images {
            ImageFormat::Raw
        } else {
            ImageFormat::Png
        }
    }
}

/// Builder for `BuildConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct BuildConfigBuilder {
    cfg: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: BuildConfig::default(),
        }
    }
    pub fn trim_images(mut self, v: bool) -> Self {
        self.cfg.trim_images = v;
        self
    }
    pub fn use_raw_images(mut self, v: bool) -> Self {
        self.cfg.use_raw_images = v;
        self
    }
    pub fn packer<P: Packer + 'static>(mut self, packer: P) -> Self {
        self.cfg.packer = Arc::new(packer);
        self
    }
    pub fn shared_packer(mut self, packer: Arc<dyn Packer>) -> Self {
        self.cfg.packer = packer;
        self
    }
    pub fn metadata_format(mut self, v: MetadataFormat) -> Self {
        self.cfg.metadata_format = v;
        self
    }
    pub fn image_base(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.image_base = Some(v.into());
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.cfg.parallel = v;
        self
    }
    pub fn build(self) -> BuildConfig {
        self.cfg
    }
}
