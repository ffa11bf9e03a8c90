//! Synthetic photos for pipeline tests.
#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;

pub const WORKER: &str = "+911234567890";

pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("PNG encoding failed");
    buf.into_inner()
}

/// Sharp, axis-aligned pattern standing in for a flat equipment label.
pub fn label_photo() -> Vec<u8> {
    encode_png(&DynamicImage::ImageLuma8(GrayImage::from_fn(128, 128, |x, y| {
        Luma([if ((x / 16) + (y / 16)) % 2 == 0 { 20 } else { 235 }])
    })))
}

/// Sharp vertical bars standing in for a compass screenshot.
pub fn azimuth_photo() -> Vec<u8> {
    encode_png(&DynamicImage::ImageLuma8(GrayImage::from_fn(128, 128, |x, _| {
        Luma([if (x / 8) % 2 == 0 { 0 } else { 255 }])
    })))
}

/// Featureless frame: fails the sharpness check.
pub fn blurry_photo() -> Vec<u8> {
    encode_png(&DynamicImage::ImageLuma8(GrayImage::from_pixel(
        96,
        96,
        Luma([128]),
    )))
}

/// Valid PNG signature, truncated body: passes format sniffing, fails decode.
pub fn truncated_photo() -> Vec<u8> {
    let mut bytes = label_photo();
    bytes.truncate(48);
    bytes
}

/// Lines a recognizer would return for a readable label and compass.
pub fn readable_text() -> Vec<String> {
    vec![
        "WLAN MAC: CC:54:FE:E3:26:F8".to_string(),
        "S/N: ABCD1234EF".to_string(),
        "Bearing 123° NE".to_string(),
    ]
}
