//! Pixel-level quality metrics: sharpness, skew and dial detection.
//!
//! All functions are pure and never fail; "could not measure" is reported
//! as `None` so callers can tell it apart from a measured failure.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

/// Sobel magnitude above which a pixel counts as an edge.
const EDGE_MAGNITUDE: f32 = 160.0;

/// Skew needs at least this share of edge pixels to be meaningful.
const MIN_EDGE_SHARE: f64 = 0.005;

/// Dial detection runs on a downscaled copy no larger than this.
const DIAL_MAX_SIDE: u32 = 128;

/// Fraction of ring samples that must sit on an edge.
const DIAL_MIN_COVERAGE: f64 = 0.75;

/// Ring coverage must beat the background edge density by this margin.
const DIAL_MIN_CONTRAST: f64 = 0.5;

/// Minimum |cos| between an edge gradient and the ring radius.
const DIAL_RADIAL_ALIGNMENT: f32 = 0.9;

const DIAL_SAMPLES: usize = 36;

/// Decode raw bytes into an image.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Variance of the 4-neighbour Laplacian. Higher is sharper; unitless.
pub fn sharpness_score(img: &DynamicImage) -> f64 {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut count = 0.0;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let c = px(&gray, x, y);
            let lap = px(&gray, x - 1, y) + px(&gray, x + 1, y) + px(&gray, x, y - 1)
                + px(&gray, x, y + 1)
                - 4.0 * c;
            sum += lap;
            sum_sq += lap * lap;
            count += 1.0;
        }
    }
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Deviation (degrees, 0..=45) of the dominant edge orientation from the
/// nearest image axis. `None` when the frame has too few strong edges to
/// outline a label or panel.
pub fn skew_degrees(img: &DynamicImage) -> Option<f64> {
    let gray = img.to_luma8();
    let gradients = sobel(&gray);
    if gradients.is_empty() {
        return None;
    }

    // 1-degree bins over orientations folded into [0, 90).
    let mut histogram = [0.0f64; 90];
    let mut edges = 0usize;
    for &(gx, gy) in &gradients {
        let magnitude = (gx * gx + gy * gy).sqrt();
        if magnitude < EDGE_MAGNITUDE {
            continue;
        }
        edges += 1;
        let angle = (gy as f64).atan2(gx as f64).to_degrees().rem_euclid(90.0);
        let bin = (angle.round() as usize) % 90;
        histogram[bin] += magnitude as f64;
    }

    if (edges as f64) < MIN_EDGE_SHARE * gradients.len() as f64 {
        return None;
    }

    let (peak, _) = histogram
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    let peak = peak as f64;
    Some(peak.min(90.0 - peak))
}

/// Whether the frame is dominated by a large circular outline, the
/// signature of a compass dial.
pub fn has_dial(img: &DynamicImage) -> bool {
    let small = if img.width().max(img.height()) > DIAL_MAX_SIDE {
        img.resize(DIAL_MAX_SIDE, DIAL_MAX_SIDE, FilterType::Triangle)
    } else {
        img.clone()
    };
    let gray = small.to_luma8();
    let (w, h) = gray.dimensions();
    if w < 16 || h < 16 {
        return false;
    }

    let gradients = sobel(&gray);
    let edges = gradients
        .iter()
        .filter(|(gx, gy)| (gx * gx + gy * gy).sqrt() >= EDGE_MAGNITUDE)
        .count();
    let density = edges as f64 / gradients.len() as f64;

    // An edge pixel near (x, y) whose gradient runs along the radius `theta`.
    let radial_edge = |x: i64, y: i64, theta: f64| -> bool {
        let (rx, ry) = (theta.cos() as f32, theta.sin() as f32);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx as u32 >= w || ny as u32 >= h {
                    continue;
                }
                let (gx, gy) = gradients[ny as usize * w as usize + nx as usize];
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude >= EDGE_MAGNITUDE
                    && ((gx * rx + gy * ry) / magnitude).abs() >= DIAL_RADIAL_ALIGNMENT
                {
                    return true;
                }
            }
        }
        false
    };

    let short = w.min(h) as i64;
    let min_r = (short / 6).max(4);
    let max_r = short / 2;
    let (cx0, cx1) = (w as i64 / 4, 3 * w as i64 / 4);
    let (cy0, cy1) = (h as i64 / 4, 3 * h as i64 / 4);

    for cy in (cy0..=cy1).step_by(4) {
        for cx in (cx0..=cx1).step_by(4) {
            for r in (min_r..=max_r).step_by(2) {
                let hits = (0..DIAL_SAMPLES)
                    .filter(|i| {
                        let theta = *i as f64 * std::f64::consts::TAU / DIAL_SAMPLES as f64;
                        let x = cx + (r as f64 * theta.cos()).round() as i64;
                        let y = cy + (r as f64 * theta.sin()).round() as i64;
                        radial_edge(x, y, theta)
                    })
                    .count();
                let coverage = hits as f64 / DIAL_SAMPLES as f64;
                if coverage >= DIAL_MIN_COVERAGE && coverage - density >= DIAL_MIN_CONTRAST {
                    return true;
                }
            }
        }
    }
    false
}

fn px(gray: &GrayImage, x: u32, y: u32) -> f64 {
    gray.get_pixel(x, y).0[0] as f64
}

/// Sobel gradients for every pixel, zero on the one-pixel border.
fn sobel(gray: &GrayImage) -> Vec<(f32, f32)> {
    let (w, h) = gray.dimensions();
    let mut out = vec![(0.0f32, 0.0f32); (w * h) as usize];
    if w < 3 || h < 3 {
        return out;
    }
    let p = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f32;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (p(x + 1, y - 1) + 2.0 * p(x + 1, y) + p(x + 1, y + 1))
                - (p(x - 1, y - 1) + 2.0 * p(x - 1, y) + p(x - 1, y + 1));
            let gy = (p(x - 1, y + 1) + 2.0 * p(x, y + 1) + p(x + 1, y + 1))
                - (p(x - 1, y - 1) + 2.0 * p(x, y - 1) + p(x + 1, y - 1));
            out[(y * w + x) as usize] = (gx, gy);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(side: u32, cell: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(side, side, |x, y| {
            Luma([if ((x / cell) + (y / cell)) % 2 == 0 { 0 } else { 255 }])
        }))
    }

    fn blank(side: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(side, side, Luma([128])))
    }

    fn ring(side: u32, inner: f64, outer: f64) -> DynamicImage {
        let c = side as f64 / 2.0;
        DynamicImage::ImageLuma8(GrayImage::from_fn(side, side, |x, y| {
            let d = ((x as f64 - c).powi(2) + (y as f64 - c).powi(2)).sqrt();
            Luma([if d >= inner && d <= outer { 255 } else { 0 }])
        }))
    }

    #[test]
    fn test_sharp_pattern_scores_high() {
        assert!(sharpness_score(&checkerboard(128, 8)) > 1000.0);
    }

    #[test]
    fn test_flat_image_scores_zero() {
        assert_eq!(sharpness_score(&blank(64)), 0.0);
    }

    #[test]
    fn test_blurred_scores_lower() {
        let sharp = checkerboard(128, 8);
        let blurred = sharp.blur(3.0);
        assert!(sharpness_score(&blurred) < sharpness_score(&sharp));
    }

    #[test]
    fn test_axis_aligned_edges_have_no_skew() {
        let skew = skew_degrees(&checkerboard(128, 16)).unwrap();
        assert!(skew < 2.0, "skew was {}", skew);
    }

    #[test]
    fn test_diagonal_edges_are_skewed() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(128, 128, |x, y| {
            Luma([if ((x + y) / 16) % 2 == 0 { 0 } else { 255 }])
        }));
        let skew = skew_degrees(&img).unwrap();
        assert!(skew > 40.0, "skew was {}", skew);
    }

    #[test]
    fn test_no_edges_means_no_skew() {
        assert!(skew_degrees(&blank(64)).is_none());
    }

    #[test]
    fn test_ring_is_a_dial() {
        assert!(has_dial(&ring(128, 40.0, 46.0)));
    }

    #[test]
    fn test_grid_is_not_a_dial() {
        assert!(!has_dial(&checkerboard(128, 16)));
    }

    #[test]
    fn test_blank_is_not_a_dial() {
        assert!(!has_dial(&blank(128)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"definitely not an image").is_err());
    }
}
