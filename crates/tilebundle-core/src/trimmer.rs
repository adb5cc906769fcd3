use image::RgbaImage;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bounds::BoundsScanner;
use crate::codec::{ImageFormat, encode_image};
use crate::compositing::blit_region;
use crate::error::{BundleError, Result};
use crate::model::{Rect, TileSet, TrimResult, TrimStats};
use crate::packer::{PackInput, PackLayout, Packer};
use crate::pixels::PixelSource;

/// New atlas image plus the per-sprite trim results, indexed by sprite.
#[derive(Debug, Clone)]
pub struct TrimmedAtlas {
    pub image: RgbaImage,
    pub results: Vec<TrimResult>,
    pub stats: TrimStats,
}

impl TrimmedAtlas {
    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        encode_image(&self.image, format)
    }
}

/// Trims sprite cells to their opaque bounds and repacks them with a [`Packer`].
///
/// The source image is never modified.
pub struct Trimmer<'a> {
    packer: &'a dyn Packer,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel: bool,
}

impl<'a> Trimmer<'a> {
    pub fn new(packer: &'a dyn Packer) -> Self {
        Self {
            packer,
            parallel: false,
        }
    }

    /// Scan cells on the rayon pool (needs the `parallel` feature).
    pub fn parallel(mut self, v: bool) -> Self {
        self.parallel = v;
        self
    }

    /// Trims every declared sprite of `tile_set`, cells taken from its layout.
    pub fn trim_tile_set(&self, tile_set: &TileSet, image: &RgbaImage) -> Result<TrimmedAtlas> {
        let cells = tile_set.sprite_cells(image.width(), image.height())?;
        self.trim_cells(image, &cells)
    }

    #[instrument(skip_all, fields(cells = cells.len(), packer = self.packer.name()))]
    pub fn trim_cells(&self, image: &RgbaImage, cells: &[Rect]) -> Result<TrimmedAtlas> {
        let bounds = self.scan_cells(image, cells)?;

        // Fully transparent sprites stay out of the packer.
        let inputs: Vec<PackInput> = bounds
            .iter()
            .enumerate()
            .filter_map(|(idx, b)| b.map(|r| PackInput::new(idx, r.w, r.h)))
            .collect();
        let layout = self.packer.pack(&inputs)?;
        let placements = check_layout(&layout, &inputs, cells.len())?;

        let mut canvas = RgbaImage::new(layout.width.max(1), layout.height.max(1));
        let mut results = vec![TrimResult::default(); cells.len()];
        let mut stats = TrimStats {
            sprites: cells.len(),
            atlas_area: layout.width as u64 * layout.height as u64,
            ..Default::default()
        };

        for (idx, (cell, b)) in cells.iter().zip(&bounds).enumerate() {
            stats.source_area += cell.area();
            let Some(b) = b else {
                stats.degenerate += 1;
                continue;
            };
            let Some(placement) = placements[idx] else {
                return Err(BundleError::Pack(format!("packer dropped sprite {idx}")));
            };
            let source = Rect::new(cell.x + b.x, cell.y + b.y, b.w, b.h);
            blit_region(image, &mut canvas, source, placement.x, placement.y);
            if b.w < cell.w || b.h < cell.h {
                stats.trimmed += 1;
            }
            stats.used_area += b.area();
            results[idx] = TrimResult {
                placement,
                trim_x: b.x,
                trim_y: b.y,
            };
        }

        debug!(
            width = canvas.width(),
            height = canvas.height(),
            summary = %stats.summary(),
            "trimmed atlas"
        );
        Ok(TrimmedAtlas {
            image: canvas,
            results,
            stats,
        })
    }

    fn scan_cells(&self, image: &RgbaImage, cells: &[Rect]) -> Result<Vec<Option<Rect>>> {
        let scan = |(idx, cell): (usize, &Rect)| -> Result<Option<Rect>> {
            let source = PixelSource::new(image, *cell, idx)?;
            Ok(BoundsScanner::scan(&source))
        };
        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                return cells.par_iter().enumerate().map(&scan).collect();
            }
        }
        cells.iter().enumerate().map(&scan).collect()
    }
}

/// Packers are pluggable, so hold them to their contract before trusting a layout.
/// Returns the placements indexed by sprite.
fn check_layout(
    layout: &PackLayout,
    inputs: &[PackInput],
    len: usize,
) -> Result<Vec<Option<Rect>>> {
    let placements = layout.index_by_id(len)?;
    let canvas = Rect::new(0, 0, layout.width, layout.height);
    for input in inputs {
        let placed = placements[input.id].ok_or_else(|| {
            BundleError::Pack(format!("packer dropped sprite {}", input.id))
        })?;
        if placed.w != input.w || placed.h != input.h {
            return Err(BundleError::Pack(format!(
                "packer resized sprite {} from {}x{} to {}x{}",
                input.id, input.w, input.h, placed.w, placed.h
            )));
        }
        if !canvas.contains(&placed) {
            return Err(BundleError::Pack(format!(
                "sprite {} placed at {:?} outside the {}x{} canvas",
                input.id, placed, layout.width, layout.height
            )));
        }
    }
    if !layout.is_disjoint() {
        return Err(BundleError::Pack("packer produced overlapping placements".into()));
    }
    Ok(placements)
}
