use image::RgbaImage;

use crate::error::{BundleError, Result};
use crate::model::{ObjectMetrics, Sprite, TileSet, TrimResult, TrimmedSprite, TrimmedTileSet};
use crate::trimmer::{TrimmedAtlas, Trimmer};

/// Corrects sprite metrics after trimming.
///
/// The removed border is fully transparent, so drawing the trimmed pixels at the shifted
/// origin covers exactly the pixels the untrimmed cell did at the original origin.
/// The footprint is game logic and stays as declared.
pub struct MetricsAdjuster;

impl MetricsAdjuster {
    pub fn adjust(sprite: &Sprite, trim: &TrimResult) -> ObjectMetrics {
        ObjectMetrics {
            x: sprite.xorigin - trim.trim_x as i32,
            y: sprite.yorigin - trim.trim_y as i32,
            width: sprite.owidth,
            height: sprite.oheight,
        }
    }

    pub fn trimmed_sprite(sprite: &Sprite, trim: &TrimResult) -> TrimmedSprite {
        TrimmedSprite {
            bounds: trim.placement,
            metrics: Self::adjust(sprite, trim),
            priority: sprite.priority,
            spot: sprite.spot,
            constraints: sprite.constraints.clone(),
        }
    }
}

/// Trims an object tile set into a new atlas and builds the matching trimmed tile set.
///
/// `image_path` is where the caller stores the atlas; it is recorded in the result.
pub fn trim_object_tile_set(
    tile_set: &TileSet,
    image: &RgbaImage,
    trimmer: &Trimmer<'_>,
    image_path: &str,
) -> Result<(TrimmedTileSet, TrimmedAtlas)> {
    if !tile_set.is_object() {
        return Err(BundleError::InvalidInput(format!(
            "tile set '{}' is not an object tile set",
            tile_set.name().unwrap_or("<unnamed>")
        )));
    }
    let atlas = trimmer.trim_tile_set(tile_set, image)?;
    let sprites = tile_set
        .sprites()
        .iter()
        .zip(&atlas.results)
        .map(|(sprite, trim)| MetricsAdjuster::trimmed_sprite(sprite, trim))
        .collect();
    let trimmed = TrimmedTileSet {
        name: tile_set.name().unwrap_or_default().to_string(),
        image_path: image_path.to_string(),
        sprites,
        colorizations: tile_set.colorizations.clone(),
    };
    Ok((trimmed, atlas))
}
