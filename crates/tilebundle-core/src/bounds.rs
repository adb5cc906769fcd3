use crate::model::Rect;
use crate::pixels::PixelSource;

/// Finds the minimal opaque bounding box of a sprite cell.
pub struct BoundsScanner;

impl BoundsScanner {
    /// Returns the tightest rectangle (cell-local coordinates) that encloses every
    /// non-transparent pixel, or `None` when the whole cell is transparent.
    pub fn scan(source: &PixelSource<'_>) -> Option<Rect> {
        let (w, h) = (source.width(), source.height());
        if w == 0 || h == 0 {
            return None;
        }
        let mut x1 = 0;
        let mut y1 = 0;
        let mut x2 = w - 1;
        let mut y2 = h - 1;
        // left
        while x1 < w && source.column_transparent(x1, 0, h - 1) {
            x1 += 1;
        }
        if x1 >= w {
            return None;
        }
        // right
        while x2 > x1 && source.column_transparent(x2, 0, h - 1) {
            x2 -= 1;
        }
        // top
        while y1 < h && source.row_transparent(y1, x1, x2) {
            y1 += 1;
        }
        // bottom
        while y2 > y1 && source.row_transparent(y2, x1, x2) {
            y2 -= 1;
        }
        Some(Rect::new(x1, y1, x2 - x1 + 1, y2 - y1 + 1))
    }
}
