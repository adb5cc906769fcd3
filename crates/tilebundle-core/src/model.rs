use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BundleError, Result};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Inclusive right edge coordinate (`x + w - 1`).
    pub fn right(&self) -> u32 {
        self.x + self.w.saturating_sub(1)
    }
    /// Inclusive bottom edge coordinate (`y + h - 1`).
    pub fn bottom(&self) -> u32 {
        self.y + self.h.saturating_sub(1)
    }
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
    /// Returns true if `r` is fully inside `self` (inclusive edges).
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x && r.y >= self.y && r.right() <= self.right() && r.bottom() <= self.bottom()
    }
    /// True when both rectangles share at least one pixel. Empty rectangles never intersect.
    pub fn intersects(&self, r: &Rect) -> bool {
        if self.is_empty() || r.is_empty() {
            return false;
        }
        !(self.x >= r.x + r.w || r.x >= self.x + self.w || self.y >= r.y + r.h || r.y >= self.y + self.h)
    }
}

/// Interaction point of an object sprite.
///
/// On the wire an orientation of `-1` means "no spot"; in memory that is `Option<Spot>::None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Spot {
    pub x: i16,
    pub y: i16,
    pub orient: i8,
}

impl Spot {
    pub const NO_ORIENT: i8 = -1;

    pub fn from_raw(x: i16, y: i16, orient: i8) -> Option<Spot> {
        (orient != Self::NO_ORIENT).then_some(Spot { x, y, orient })
    }
}

/// Reads an optional spot, folding an explicit `"orient": -1` into `None`.
fn deserialize_spot<'de, D>(d: D) -> std::result::Result<Option<Spot>, D::Error>
where
    D: Deserializer<'de>,
{
    let spot = Option::<Spot>::deserialize(d)?;
    Ok(spot.and_then(|s| Spot::from_raw(s.x, s.y, s.orient)))
}

/// One declared entry of an object tile set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sprite {
    /// Footprint width (game-logic units).
    pub owidth: u32,
    /// Footprint height (game-logic units).
    pub oheight: u32,
    /// Render origin offset within the cell.
    #[serde(default)]
    pub xorigin: i32,
    #[serde(default)]
    pub yorigin: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i8>,
    #[serde(
        default,
        deserialize_with = "deserialize_spot",
        skip_serializing_if = "Option::is_none"
    )]
    pub spot: Option<Spot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
}

/// One row of a [`CellLayout::Rows`] layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowSpec {
    pub count: usize,
    pub width: u32,
    pub height: u32,
}

/// How sprite cells are laid out in a source tile sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CellLayout {
    /// Equal cells filling the image row-major.
    Uniform { width: u32, height: u32 },
    /// Rows of equally sized cells; each row may use a different size.
    Rows {
        rows: Vec<RowSpec>,
        #[serde(default)]
        offset: (u32, u32),
        #[serde(default)]
        gap: (u32, u32),
    },
    /// Every cell spelled out.
    Explicit { cells: Vec<Rect> },
}

impl CellLayout {
    /// Cell rectangle of tile `index` in an image `image_width` pixels wide.
    ///
    /// `None` when the layout has no such cell or its coordinates overflow.
    pub fn cell(&self, index: usize, image_width: u32) -> Option<Rect> {
        match self {
            CellLayout::Uniform { width, height } => {
                if *width == 0 || *height == 0 {
                    return None;
                }
                let per_row = (image_width / width).max(1) as usize;
                let col = u32::try_from(index % per_row).ok()?;
                let row = u32::try_from(index / per_row).ok()?;
                Some(Rect::new(
                    col.checked_mul(*width)?,
                    row.checked_mul(*height)?,
                    *width,
                    *height,
                ))
            }
            CellLayout::Rows { rows, offset, gap } => {
                let mut index = index;
                let mut y = offset.1;
                for row in rows {
                    if index < row.count {
                        let step = row.width.checked_add(gap.0)?;
                        let x = u32::try_from(index)
                            .ok()?
                            .checked_mul(step)?
                            .checked_add(offset.0)?;
                        return Some(Rect::new(x, y, row.width, row.height));
                    }
                    index -= row.count;
                    y = y.checked_add(row.height)?.checked_add(gap.1)?;
                }
                None
            }
            CellLayout::Explicit { cells } => cells.get(index).copied(),
        }
    }

    /// Number of cells the layout yields for an image of the given size.
    pub fn tile_count(&self, image_width: u32, image_height: u32) -> usize {
        match self {
            CellLayout::Uniform { width, height } => {
                if *width == 0 || *height == 0 {
                    return 0;
                }
                (image_width / width) as usize * (image_height / height) as usize
            }
            CellLayout::Rows { rows, .. } => {
                rows.iter().fold(0usize, |n, r| n.saturating_add(r.count))
            }
            CellLayout::Explicit { cells } => cells.len(),
        }
    }
}

/// What a tile set represents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TileSetKind {
    /// Decorative sheet; copied into the bundle as-is.
    #[serde(alias = "uniform")]
    Plain,
    /// Interactive objects with footprint, origin and spot metadata; eligible for trimming.
    Object { sprites: Vec<Sprite> },
}

/// A source tile set as described by the bundle description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileSet {
    #[serde(default)]
    pub name: Option<String>,
    pub image_path: String,
    pub layout: CellLayout,
    #[serde(flatten)]
    pub kind: TileSetKind,
    /// Colorization classes shared by every sprite of the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorizations: Option<Arc<[String]>>,
}

impl TileSet {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, TileSetKind::Object { .. })
    }

    /// Declared sprites; empty for plain tile sets.
    pub fn sprites(&self) -> &[Sprite] {
        match &self.kind {
            TileSetKind::Object { sprites } => sprites,
            TileSetKind::Plain => &[],
        }
    }

    /// Source cell of every declared sprite, in declaration order.
    ///
    /// Fails when the set declares more sprites than its layout yields for the image.
    pub fn sprite_cells(&self, image_width: u32, image_height: u32) -> Result<Vec<Rect>> {
        let declared = self.sprites().len();
        let available = self.layout.tile_count(image_width, image_height);
        if declared > available {
            return Err(BundleError::InvalidInput(format!(
                "tile set '{}' declares {} sprites but its layout yields {} cells in a {}x{} image",
                self.name().unwrap_or("<unnamed>"),
                declared,
                available,
                image_width,
                image_height
            )));
        }
        (0..declared)
            .map(|idx| {
                self.layout.cell(idx, image_width).ok_or_else(|| {
                    BundleError::InvalidInput(format!(
                        "tile set '{}' has no usable cell {} in its layout",
                        self.name().unwrap_or("<unnamed>"),
                        idx
                    ))
                })
            })
            .collect()
    }

    pub fn with_image_path(&self, image_path: impl Into<String>) -> TileSet {
        TileSet {
            image_path: image_path.into(),
            ..self.clone()
        }
    }
}

/// Result of trimming one sprite.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrimResult {
    /// Location and trimmed size inside the atlas image.
    pub placement: Rect,
    /// Transparent columns removed from the left of the cell.
    pub trim_x: u32,
    /// Transparent rows removed from the top of the cell.
    pub trim_y: u32,
}

impl TrimResult {
    /// Fully transparent sprite: no pixels, no atlas area.
    pub fn is_degenerate(&self) -> bool {
        self.placement.is_empty()
    }
}

/// Render origin and footprint of an object sprite.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMetrics {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A sprite of a trimmed tile set; independent of the source [`Sprite`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrimmedSprite {
    /// Location and size inside the trimmed atlas image.
    pub bounds: Rect,
    /// Corrected origin plus the unchanged footprint.
    pub metrics: ObjectMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i8>,
    #[serde(
        default,
        deserialize_with = "deserialize_spot",
        skip_serializing_if = "Option::is_none"
    )]
    pub spot: Option<Spot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
}

/// Object tile set whose sprites were trimmed and repacked into a new atlas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrimmedTileSet {
    pub name: String,
    pub image_path: String,
    pub sprites: Vec<TrimmedSprite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorizations: Option<Arc<[String]>>,
}

impl TrimmedTileSet {
    pub fn tile_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn tile_bounds(&self, idx: usize) -> Option<Rect> {
        self.sprites.get(idx).map(|s| s.bounds)
    }

    pub fn origin(&self, idx: usize) -> Option<(i32, i32)> {
        self.sprites.get(idx).map(|s| (s.metrics.x, s.metrics.y))
    }

    pub fn base_width(&self, idx: usize) -> Option<u32> {
        self.sprites.get(idx).map(|s| s.metrics.width)
    }

    pub fn base_height(&self, idx: usize) -> Option<u32> {
        self.sprites.get(idx).map(|s| s.metrics.height)
    }

    pub fn priority(&self, idx: usize) -> i8 {
        self.sprites.get(idx).and_then(|s| s.priority).unwrap_or(0)
    }

    pub fn x_spot(&self, idx: usize) -> i16 {
        self.spot(idx).map_or(0, |s| s.x)
    }

    pub fn y_spot(&self, idx: usize) -> i16 {
        self.spot(idx).map_or(0, |s| s.y)
    }

    /// Spot orientation, or `-1` when the sprite has no spot.
    pub fn spot_orient(&self, idx: usize) -> i8 {
        self.spot(idx).map_or(Spot::NO_ORIENT, |s| s.orient)
    }

    pub fn constraints(&self, idx: usize) -> Option<&[String]> {
        self.sprites.get(idx).and_then(|s| s.constraints.as_deref())
    }

    pub fn has_constraint(&self, idx: usize, constraint: &str) -> bool {
        self.constraints(idx)
            .is_some_and(|cs| cs.iter().any(|c| c == constraint))
    }

    pub fn colorizations(&self) -> Option<&[String]> {
        self.colorizations.as_deref()
    }

    fn spot(&self, idx: usize) -> Option<Spot> {
        self.sprites.get(idx).and_then(|s| s.spot)
    }
}

/// A tile set as stored in a bundle manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BundleTileSet {
    Source(TileSet),
    Trimmed(TrimmedTileSet),
}

impl BundleTileSet {
    pub fn name(&self) -> Option<&str> {
        match self {
            BundleTileSet::Source(ts) => ts.name(),
            BundleTileSet::Trimmed(ts) => Some(&ts.name),
        }
    }

    pub fn image_path(&self) -> &str {
        match self {
            BundleTileSet::Source(ts) => &ts.image_path,
            BundleTileSet::Trimmed(ts) => &ts.image_path,
        }
    }

    pub fn as_trimmed(&self) -> Option<&TrimmedTileSet> {
        match self {
            BundleTileSet::Trimmed(ts) => Some(ts),
            BundleTileSet::Source(_) => None,
        }
    }
}

/// The id -> tile set map of one bundle plus the newest source modification time.
#[derive(Debug, Clone)]
pub struct BundleManifest {
    tile_sets: BTreeMap<u32, BundleTileSet>,
    newest_source: SystemTime,
}

impl BundleManifest {
    pub fn new(newest_source: SystemTime) -> Self {
        Self {
            tile_sets: BTreeMap::new(),
            newest_source,
        }
    }

    pub fn newest_source(&self) -> SystemTime {
        self.newest_source
    }

    pub fn note_source_time(&mut self, time: SystemTime) {
        self.newest_source = self.newest_source.max(time);
    }

    pub fn insert(&mut self, id: u32, tile_set: BundleTileSet) {
        self.tile_sets.insert(id, tile_set);
    }

    pub fn get(&self, id: u32) -> Option<&BundleTileSet> {
        self.tile_sets.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tile_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tile_sets.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.tile_sets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BundleTileSet)> {
        self.tile_sets.iter().map(|(id, ts)| (*id, ts))
    }

    pub fn find_by_name(&self, name: &str) -> Option<(u32, &BundleTileSet)> {
        self.iter().find(|(_, ts)| ts.name() == Some(name))
    }

    /// Replaces entries with their staged counterparts in one step.
    pub fn merge(&mut self, staged: BTreeMap<u32, BundleTileSet>) {
        self.tile_sets.extend(staged);
    }
}

/// Statistics about one trimmed atlas.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrimStats {
    /// Number of sprites in the tile set.
    pub sprites: usize,
    /// Sprites that lost at least one transparent row or column.
    pub trimmed: usize,
    /// Fully transparent sprites.
    pub degenerate: usize,
    /// Sum of the source cell areas.
    pub source_area: u64,
    /// Sum of the trimmed sprite areas.
    pub used_area: u64,
    /// Area of the atlas canvas.
    pub atlas_area: u64,
}

impl TrimStats {
    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Sprites: {}, Trimmed: {}, Degenerate: {}, Source Area: {} px², Atlas Area: {} px², Saved: {:.2}%",
            self.sprites,
            self.trimmed,
            self.degenerate,
            self.source_area,
            self.atlas_area,
            self.saved_percentage(),
        )
    }

    /// Returns saved space as a percentage of the source cell area (0.0 to 100.0).
    pub fn saved_percentage(&self) -> f64 {
        if self.source_area > 0 {
            (self.source_area.saturating_sub(self.atlas_area) as f64 / self.source_area as f64)
                * 100.0
        } else {
            0.0
        }
    }

    /// Occupancy ratio: used_area / atlas_area (0.0 to 1.0).
    pub fn occupancy(&self) -> f64 {
        if self.atlas_area > 0 {
            self.used_area as f64 / self.atlas_area as f64
        } else {
            0.0
        }
    }
}
