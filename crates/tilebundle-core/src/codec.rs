//! Atlas image encodings and image loading.
//!
//! Two encodings are supported: PNG, and a fast uncompressed "raw" format that the
//! runtime can map straight into a pixel buffer:
//!
//! ```text
//! magic   "TBRW"        4 bytes
//! version u16 LE        currently 1
//! width   u32 LE
//! height  u32 LE
//! pixels  width*height*4 bytes, RGBA8, row-major
//! ```

use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use image::{ColorType, DynamicImage, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

pub const RAW_MAGIC: &[u8; 4] = b"TBRW";
pub const RAW_VERSION: u16 = 1;
/// File suffix used for raw-encoded images.
pub const RAW_SUFFIX: &str = "raw";

/// Encoding used for images written into a bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Raw,
}

impl ImageFormat {
    pub fn suffix(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Raw => RAW_SUFFIX,
        }
    }
}

/// Encode `img` in the requested format.
pub fn encode_image(img: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        ImageFormat::Png => {
            DynamicImage::ImageRgba8(img.clone())
                .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
        }
        ImageFormat::Raw => write_raw(img, &mut out)?,
    }
    Ok(out)
}

pub fn write_raw<W: Write>(img: &RgbaImage, mut w: W) -> Result<()> {
    w.write_all(RAW_MAGIC)?;
    w.write_u16::<LittleEndian>(RAW_VERSION)?;
    w.write_u32::<LittleEndian>(img.width())?;
    w.write_u32::<LittleEndian>(img.height())?;
    w.write_all(img.as_raw())?;
    Ok(())
}

pub fn read_raw<R: Read>(mut r: R) -> Result<RgbaImage> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != RAW_MAGIC {
        return Err(BundleError::InvalidInput("not a raw image (bad magic)".into()));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != RAW_VERSION {
        return Err(BundleError::InvalidInput(format!(
            "unsupported raw image version {version}"
        )));
    }
    let width = r.read_u32::<LittleEndian>()?;
    let height = r.read_u32::<LittleEndian>()?;
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| BundleError::InvalidInput("raw image dimensions overflow".into()))?;
    let mut pixels = vec![0u8; len];
    r.read_exact(&mut pixels)?;
    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| BundleError::InvalidInput("raw image buffer size mismatch".into()))
}

/// Only 8-bit colour images convert to raw without loss.
pub fn can_write_raw(img: &DynamicImage) -> bool {
    matches!(
        img.color(),
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8
    )
}

/// Replaces the image suffix with `.raw`.
pub fn adjust_image_path(image_path: &str) -> String {
    let stem = match image_path.rfind('.') {
        Some(dot) if !image_path[dot..].contains('/') => &image_path[..dot],
        _ => image_path,
    };
    format!("{stem}.{RAW_SUFFIX}")
}

/// Path of an image after optional raw conversion.
pub fn output_image_path(image_path: &str, format: ImageFormat) -> String {
    match format {
        ImageFormat::Raw => adjust_image_path(image_path),
        ImageFormat::Png => image_path.to_string(),
    }
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let decode = || -> std::result::Result<DynamicImage, image::ImageError> {
        ImageReader::open(path)?.with_guessed_format()?.decode()
    };
    decode().map_err(|source| BundleError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })
}
