use super::{PackInput, PackLayout, Packer};
use crate::error::{BundleError, Result};
use crate::model::Rect;

/// Default maximum strip width in pixels.
pub const DEFAULT_STRIP_WIDTH: u32 = 1024;

/// Greedy shelf packer.
///
/// Rectangles are taken in input order and laid left to right along a strip of at most
/// `max_width` pixels. When the next one does not fit, a new row starts below the tallest
/// rectangle of the current row. A rectangle wider than the strip gets a row of its own and
/// widens the canvas. Zero-size rectangles take a zero-area slot at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripPacker {
    max_width: u32,
}

impl StripPacker {
    pub fn new(max_width: u32) -> Self {
        Self { max_width }
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }
}

impl Default for StripPacker {
    fn default() -> Self {
        Self::new(DEFAULT_STRIP_WIDTH)
    }
}

impl Packer for StripPacker {
    fn name(&self) -> &str {
        "strip"
    }

    fn pack(&self, rects: &[PackInput]) -> Result<PackLayout> {
        if self.max_width == 0 {
            return Err(BundleError::InvalidConfig(
                "strip packer max_width must be > 0".into(),
            ));
        }
        let mut placements = Vec::with_capacity(rects.len());
        let (mut x, mut y) = (0u32, 0u32);
        let mut row_h = 0u32;
        let mut canvas_w = 0u32;

        for r in rects {
            if r.w == 0 || r.h == 0 {
                placements.push((r.id, Rect::new(x, y, 0, 0)));
                continue;
            }
            let right = x.checked_add(r.w).ok_or_else(|| {
                BundleError::Pack(format!("strip overflow placing rect {}", r.id))
            })?;
            if x > 0 && right > self.max_width {
                y = y.checked_add(row_h).ok_or_else(|| {
                    BundleError::Pack(format!("strip overflow placing rect {}", r.id))
                })?;
                x = 0;
                row_h = 0;
            }
            placements.push((r.id, Rect::new(x, y, r.w, r.h)));
            x += r.w;
            row_h = row_h.max(r.h);
            canvas_w = canvas_w.max(x);
        }

        let height = y
            .checked_add(row_h)
            .ok_or_else(|| BundleError::Pack("strip overflow sizing the canvas".into()))?;
        Ok(PackLayout {
            width: canvas_w,
            height,
            placements,
        })
    }
}
