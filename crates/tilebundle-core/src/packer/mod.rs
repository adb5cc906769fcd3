use std::fmt::Debug;

use crate::error::{BundleError, Result};
use crate::model::Rect;

pub mod strip;

pub use strip::StripPacker;

/// A rectangle to place, identified by the caller's id (the sprite index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackInput {
    pub id: usize,
    pub w: u32,
    pub h: u32,
}

impl PackInput {
    pub fn new(id: usize, w: u32, h: u32) -> Self {
        Self { id, w, h }
    }
}

/// Placement of every input on a single canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackLayout {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// `(id, placed rect)` in input order.
    pub placements: Vec<(usize, Rect)>,
}

impl PackLayout {
    pub fn get(&self, id: usize) -> Option<Rect> {
        self.placements
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, r)| *r)
    }

    /// Placements indexed by id for ids below `len`.
    ///
    /// Fails on an id outside `0..len` or an id placed twice.
    pub fn index_by_id(&self, len: usize) -> Result<Vec<Option<Rect>>> {
        let mut index = vec![None; len];
        for &(id, rect) in &self.placements {
            let slot = index
                .get_mut(id)
                .ok_or_else(|| BundleError::Pack(format!("packer placed unknown sprite {id}")))?;
            if slot.replace(rect).is_some() {
                return Err(BundleError::Pack(format!("packer placed sprite {id} twice")));
            }
        }
        Ok(index)
    }

    /// True when no two non-empty placements share a pixel.
    pub fn is_disjoint(&self) -> bool {
        let mut rects: Vec<&Rect> = self
            .placements
            .iter()
            .map(|(_, r)| r)
            .filter(|r| !r.is_empty())
            .collect();
        rects.sort_unstable_by_key(|r| (r.y, r.x));
        // sweep top to bottom; only rects starting above another's bottom can overlap it
        for (i, a) in rects.iter().enumerate() {
            let bottom = a.y as u64 + a.h as u64;
            for b in &rects[i + 1..] {
                if b.y as u64 >= bottom {
                    break;
                }
                if a.intersects(b) {
                    return false;
                }
            }
        }
        true
    }
}

/// A packer places rectangles onto one canvas.
///
/// Implementations must place every input exactly once, never overlap two non-empty
/// rectangles, and size the canvas to cover every placement. The trimmer only ever talks
/// to this trait, so alternative heuristics can be swapped in through the build config.
pub trait Packer: Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;
    fn pack(&self, rects: &[PackInput]) -> Result<PackLayout>;
}
