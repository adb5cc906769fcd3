use image::RgbaImage;

use crate::error::{BundleError, Result};
use crate::model::Rect;

/// Read-only view over one cell of a decoded image.
///
/// Coordinates passed to [`PixelSource::is_opaque`] are cell-local.
#[derive(Clone, Copy)]
pub struct PixelSource<'a> {
    image: &'a RgbaImage,
    cell: Rect,
}

impl<'a> PixelSource<'a> {
    /// Fails with `CellOutOfBounds` when `cell` does not lie inside `image`.
    pub fn new(image: &'a RgbaImage, cell: Rect, index: usize) -> Result<Self> {
        let (iw, ih) = image.dimensions();
        let fits = cell.x as u64 + cell.w as u64 <= iw as u64
            && cell.y as u64 + cell.h as u64 <= ih as u64;
        if !fits {
            return Err(BundleError::CellOutOfBounds {
                index,
                cell,
                width: iw,
                height: ih,
            });
        }
        Ok(Self { image, cell })
    }

    pub fn cell(&self) -> Rect {
        self.cell
    }

    pub fn width(&self) -> u32 {
        self.cell.w
    }

    pub fn height(&self) -> u32 {
        self.cell.h
    }

    /// Any alpha above zero counts as opaque.
    pub fn is_opaque(&self, x: u32, y: u32) -> Result<bool> {
        if x >= self.cell.w || y >= self.cell.h {
            return Err(BundleError::OutOfBounds {
                x,
                y,
                width: self.cell.w,
                height: self.cell.h,
            });
        }
        Ok(self.alpha_at(x, y) > 0)
    }

    #[inline]
    fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(self.cell.x + x, self.cell.y + y)[3]
    }

    #[inline]
    pub(crate) fn column_transparent(&self, x: u32, y_from: u32, y_to: u32) -> bool {
        (y_from..=y_to).all(|y| self.alpha_at(x, y) == 0)
    }

    #[inline]
    pub(crate) fn row_transparent(&self, y: u32, x_from: u32, x_to: u32) -> bool {
        (x_from..=x_to).all(|x| self.alpha_at(x, y) == 0)
    }
}
