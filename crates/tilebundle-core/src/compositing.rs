use image::RgbaImage;

use crate::model::Rect;

/// Copy the `source` sub-rectangle of `src` into `canvas` with its top-left at (dx, dy).
///
/// Pixels that would land outside the canvas are dropped.
pub fn blit_region(src: &RgbaImage, canvas: &mut RgbaImage, source: Rect, dx: u32, dy: u32) {
    let (cw, ch) = canvas.dimensions();
    for yy in 0..source.h {
        if dy + yy >= ch {
            break;
        }
        for xx in 0..source.w {
            if dx + xx >= cw {
                break;
            }
            let px = *src.get_pixel(source.x + xx, source.y + yy);
            canvas.put_pixel(dx + xx, dy + yy, px);
        }
    }
}
