use std::sync::Arc;

use image::DynamicImage;
use tracing::debug;

use crate::models::job::Thresholds;
use crate::models::photo::{CheckProfile, ExtractedFields, PhotoStatus, PhotoType, QualityChecks};
use crate::models::verification::Verdict;
use crate::services::dedupe::{self, Fingerprint};
use crate::services::extraction;
use crate::services::imaging;
use crate::services::ocr::{OcrError, TextRecognizer};

pub const REASON_BLURRY: &str = "Image is blurry";
pub const REASON_SKEWED: &str = "Label angle too skewed";
pub const REASON_NO_LABEL_IDS: &str = "Could not read MAC/RSN from label";
pub const REASON_NO_AZIMUTH: &str = "Could not read compass/azimuth value";

/// Pixel metrics computed off the async runtime.
struct Measurements {
    sharpness: f64,
    fingerprint: Fingerprint,
    dial: bool,
}

impl Measurements {
    fn take(img: &DynamicImage, classify: bool) -> Self {
        Self {
            sharpness: imaging::sharpness_score(img),
            fingerprint: dedupe::fingerprint(img),
            dial: classify && imaging::has_dial(img),
        }
    }
}

/// Decode raw bytes and evaluate them. Undecodable input is an error, not
/// a FAIL verdict.
pub async fn evaluate_bytes(
    bytes: &[u8],
    expected_type: Option<&PhotoType>,
    prior: &[(PhotoType, Fingerprint)],
    thresholds: &Thresholds,
    recognizer: &dyn TextRecognizer,
) -> Result<Verdict, ValidationError> {
    let image = imaging::decode(bytes).map_err(ValidationError::Decode)?;
    evaluate(Arc::new(image), expected_type, prior, thresholds, recognizer).await
}

/// Run every check the photo type calls for and adjudicate pass/fail.
///
/// Performs:
/// - Sharpness, always; a blurry photo still gets the remaining checks
/// - Type resolution: the expected type, else a dial/degree heuristic
/// - Duplicate flag against earlier photos of the same type (advisory)
/// - Label photos: skew + MAC/RSN extraction
/// - Azimuth photos: compass reading extraction
/// - Other types: nothing further, no text recognition
pub async fn evaluate(
    image: Arc<DynamicImage>,
    expected_type: Option<&PhotoType>,
    prior: &[(PhotoType, Fingerprint)],
    thresholds: &Thresholds,
    recognizer: &dyn TextRecognizer,
) -> Result<Verdict, ValidationError> {
    let classify = expected_type.is_none();
    let measured = {
        let img = image.clone();
        tokio::task::spawn_blocking(move || Measurements::take(&img, classify)).await?
    };

    let mut reasons = Vec::new();
    let mut checks = QualityChecks {
        sharpness: Some(measured.sharpness),
        ..Default::default()
    };

    // ── Sharpness ────────────────────────────────────────────────────
    if measured.sharpness < thresholds.blur_min {
        reasons.push(REASON_BLURRY.to_string());
    }

    // ── Type resolution ──────────────────────────────────────────────
    let mut recognized: Option<Vec<String>> = None;
    let resolved_type = match expected_type {
        Some(expected) => expected.clone(),
        None if measured.dial => PhotoType::azimuth(),
        None => {
            let lines = recognizer.recognize(&image).await?;
            let resolved = if extraction::mentions_degrees(&lines.join("\n")) {
                PhotoType::azimuth()
            } else {
                PhotoType::label()
            };
            recognized = Some(lines);
            resolved
        }
    };

    // ── Duplicate (advisory only) ────────────────────────────────────
    checks.duplicate = dedupe::is_duplicate(
        measured.fingerprint,
        &resolved_type,
        prior,
        thresholds.dup_hamming_max,
    );

    // ── Type-specific checks ─────────────────────────────────────────
    let mut fields = ExtractedFields::default();
    let mut extracted_text = None;

    match resolved_type.profile() {
        CheckProfile::Label => {
            let skew = {
                let img = image.clone();
                tokio::task::spawn_blocking(move || imaging::skew_degrees(&img)).await?
            };
            checks.skew_deg = skew;

            let text = match recognized.take() {
                Some(lines) => lines,
                None => recognizer.recognize(&image).await?,
            }
            .join("\n");
            fields = extraction::extract_label_fields(&text);
            let has_ids = fields.has_label_ids();
            checks.has_label_ids = Some(has_ids);

            // Skew only disqualifies when it also cost us the identifiers.
            if skew.is_some_and(|s| s > thresholds.label_skew_max) {
                if has_ids {
                    checks.skew_warning = true;
                } else {
                    reasons.push(REASON_SKEWED.to_string());
                }
            }
            if !has_ids {
                reasons.push(REASON_NO_LABEL_IDS.to_string());
            }
            extracted_text = Some(text);
        }
        CheckProfile::Azimuth => {
            let text = match recognized.take() {
                Some(lines) => lines,
                None => recognizer.recognize(&image).await?,
            }
            .join("\n");
            fields = extraction::extract_azimuth_fields(&text);
            if fields.azimuth_deg.is_none() {
                reasons.push(REASON_NO_AZIMUTH.to_string());
            }
            extracted_text = Some(text);
        }
        CheckProfile::Plain => {}
    }

    let status = if reasons.is_empty() {
        PhotoStatus::Pass
    } else {
        PhotoStatus::Fail
    };

    debug!(
        resolved_type = %resolved_type,
        status = %status,
        sharpness = measured.sharpness,
        duplicate = checks.duplicate,
        issues_count = reasons.len(),
        "Validation complete"
    );

    Ok(Verdict {
        resolved_type,
        fingerprint: measured.fingerprint,
        fields,
        checks,
        extracted_text,
        status,
        reasons,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Text recognition failed: {0}")]
    Recognition(#[from] OcrError),

    #[error("Metric computation was interrupted: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}
