use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use tilebundle_core::codec::{
    ImageFormat, RAW_MAGIC, adjust_image_path, can_write_raw, encode_image, load_image,
    output_image_path, read_raw, write_raw,
};
use tilebundle_core::error::BundleError;

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, (x ^ y) as u8, (x * 7) as u8]))
}

#[test]
fn raw_header_layout() {
    let img = gradient(3, 2);
    let bytes = encode_image(&img, ImageFormat::Raw).unwrap();
    assert_eq!(&bytes[0..4], RAW_MAGIC);
    assert_eq!(&bytes[4..6], &[1, 0]);
    assert_eq!(&bytes[6..10], &[3, 0, 0, 0]);
    assert_eq!(&bytes[10..14], &[2, 0, 0, 0]);
    assert_eq!(bytes.len(), 14 + 3 * 2 * 4);
    assert_eq!(read_raw(Cursor::new(&bytes)).unwrap(), img);
}

#[test]
fn png_encoding_decodes_to_same_pixels() {
    let img = gradient(9, 4);
    let bytes = encode_image(&img, ImageFormat::Png).unwrap();
    let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!(back, img);
}

#[test]
fn truncated_raw_is_an_error() {
    let mut bytes = Vec::new();
    write_raw(&gradient(4, 4), &mut bytes).unwrap();
    bytes.truncate(bytes.len() - 1);
    assert!(matches!(read_raw(Cursor::new(&bytes)), Err(BundleError::Io(_))));
}

#[test]
fn bad_magic_is_rejected() {
    let bytes = b"PNG!\x01\x00\x01\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00";
    assert!(matches!(read_raw(Cursor::new(&bytes[..])), Err(BundleError::InvalidInput(_))));
}

#[test]
fn only_eight_bit_images_convert() {
    assert!(can_write_raw(&DynamicImage::ImageRgba8(gradient(2, 2))));
    assert!(can_write_raw(&DynamicImage::ImageLuma8(GrayImage::new(2, 2))));
    let deep: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(2, 2);
    assert!(!can_write_raw(&DynamicImage::ImageLuma16(deep)));
}

#[test]
fn image_paths_get_raw_suffix() {
    assert_eq!(adjust_image_path("sets/chairs.png"), "sets/chairs.raw");
    assert_eq!(adjust_image_path("sets.v2/chairs"), "sets.v2/chairs.raw");
    assert_eq!(adjust_image_path("tiles.big.jpg"), "tiles.big.raw");
    assert_eq!(output_image_path("a.png", ImageFormat::Png), "a.png");
    assert_eq!(output_image_path("a.png", ImageFormat::Raw), "a.raw");
}

#[test]
fn load_reports_decode_failures_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not an image").unwrap();
    match load_image(&path) {
        Err(BundleError::ImageDecode { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected decode error, got {other:?}"),
    }
}
