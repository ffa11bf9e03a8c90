//! Perceptual fingerprints for spotting resent photos.
//!
//! A DCT hash: the image is reduced to 32x32 grayscale, transformed, and
//! the 8x8 lowest frequencies are thresholded against their median. Lossy
//! re-encoding barely moves those coefficients, so a resend lands within a
//! few bits of the original.

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::models::photo::PhotoType;

const HASH_SIDE: usize = 32;
const LOW_FREQ: usize = 8;

/// 64-bit perceptual hash, stored as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const BITS: u32 = 64;

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Hamming distance; symmetric and bounded by [`Fingerprint::BITS`].
    pub fn distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid fingerprint '{0}': expected 16 hex digits")]
pub struct FingerprintParseError(String);

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(FingerprintParseError(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Fingerprint)
            .map_err(|_| FingerprintParseError(s.to_string()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}

/// Compute the perceptual hash of an image. Deterministic.
pub fn fingerprint(img: &DynamicImage) -> Fingerprint {
    let small = img
        .resize_exact(HASH_SIDE as u32, HASH_SIDE as u32, FilterType::Triangle)
        .to_luma8();
    let pixels: Vec<f64> = small.pixels().map(|p| p.0[0] as f64).collect();

    let mut coeffs = [0.0f64; LOW_FREQ * LOW_FREQ];
    for v in 0..LOW_FREQ {
        for u in 0..LOW_FREQ {
            coeffs[v * LOW_FREQ + u] = dct_coefficient(&pixels, u, v);
        }
    }

    let mut sorted = coeffs;
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

    let bits = coeffs
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > median)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    Fingerprint(bits)
}

fn dct_coefficient(pixels: &[f64], u: usize, v: usize) -> f64 {
    let n = HASH_SIDE as f64;
    let mut sum = 0.0;
    for y in 0..HASH_SIDE {
        let cy = ((2 * y + 1) as f64 * v as f64 * std::f64::consts::PI / (2.0 * n)).cos();
        for x in 0..HASH_SIDE {
            let cx = ((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / (2.0 * n)).cos();
            sum += pixels[y * HASH_SIDE + x] * cx * cy;
        }
    }
    sum
}

/// A photo counts as a duplicate when any earlier PASS/FAIL photo of the
/// same type in the job lies within `max_distance`.
pub fn is_duplicate(
    candidate: Fingerprint,
    resolved_type: &PhotoType,
    prior: &[(PhotoType, Fingerprint)],
    max_distance: u32,
) -> bool {
    prior
        .iter()
        .filter(|(photo_type, _)| photo_type == resolved_type)
        .any(|(_, fp)| candidate.distance(*fp) <= max_distance)
}
