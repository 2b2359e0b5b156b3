use std::io::Cursor;
use std::path::PathBuf;

use super::*;
use crate::media::color::ColorSpace;

fn png_bytes(rgba: Vec<u8>, w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(w, h, rgba).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn decode_image_keeps_straight_alpha() {
    let buf = png_bytes(vec![100u8, 50u8, 200u8, 128u8], 1, 1);
    let frame = decode_image(&buf, ColorSpace::Srgb.into()).unwrap();
    assert_eq!(frame.dimensions(), (1, 1));
    assert_eq!(frame.rgba8.as_slice(), &[100, 50, 200, 128]);
    assert_eq!(frame.color, ColorTag::Known(ColorSpace::Srgb));
}

#[test]
fn decode_garbage_is_an_error() {
    assert!(decode_image(b"not an image", ColorTag::Untagged).is_err());
}

#[test]
fn decode_missing_file_is_media_decode() {
    let err = decode_image_file(
        &PathBuf::from("target/does/not/exist.png"),
        ColorTag::Untagged,
    )
    .unwrap_err();
    assert!(matches!(err, StageCheckError::MediaDecode { .. }));
}

#[test]
fn decode_corrupt_file_is_media_decode() {
    let dir = PathBuf::from("target").join("unit_decode");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("corrupt.png");
    std::fs::write(&path, b"\x89PNG garbage").unwrap();

    let err = decode_image_file(&path, ColorTag::Untagged).unwrap_err();
    assert!(matches!(err, StageCheckError::MediaDecode { .. }));
}
