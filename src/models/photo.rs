use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::services::dedupe::Fingerprint;

/// Canonical photo-type code, e.g. `LABEL` or `AZIMUTH`.
///
/// Construction always canonicalises, so two codes compare equal whenever
/// they name the same kind of photo ("labelling" and "LABEL" included).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PhotoType(String);

/// Which extra checks the validation pipeline runs for a photo type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckProfile {
    /// Skew + MAC/RSN extraction.
    Label,
    /// Compass reading extraction.
    Azimuth,
    /// Sharpness and duplicate checks only.
    Plain,
}

impl PhotoType {
    pub const LABEL: &'static str = "LABEL";
    pub const AZIMUTH: &'static str = "AZIMUTH";
    pub const GENERIC: &'static str = "PHOTO";

    pub fn new(raw: &str) -> Self {
        let key = raw.trim().to_lowercase();
        let canonical = match key.as_str() {
            "" => Self::GENERIC.to_string(),
            "label" | "labelling" | "labeling" => Self::LABEL.to_string(),
            "angle" | "azimuth" | "azi" => Self::AZIMUTH.to_string(),
            _ => key.to_uppercase(),
        };
        Self(canonical)
    }

    pub fn label() -> Self {
        Self(Self::LABEL.to_string())
    }

    pub fn azimuth() -> Self {
        Self(Self::AZIMUTH.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn profile(&self) -> CheckProfile {
        match self.0.as_str() {
            Self::LABEL => CheckProfile::Label,
            Self::AZIMUTH => CheckProfile::Azimuth,
            _ => CheckProfile::Plain,
        }
    }

    /// Human-friendly name used in chat replies.
    pub fn display_name(&self) -> String {
        match self.0.as_str() {
            Self::LABEL => "Label Photo".to_string(),
            Self::AZIMUTH => "Azimuth Photo".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => format!("{}{} Photo", first, chars.as_str().to_lowercase()),
                    None => "Photo".to_string(),
                }
            }
        }
    }
}

impl From<String> for PhotoType {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for PhotoType {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<PhotoType> for String {
    fn from(t: PhotoType) -> Self {
        t.0
    }
}

impl std::fmt::Display for PhotoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing state of a submitted photo.
///
/// `Pass`, `Fail` and `Error` are terminal. `Error` marks photos that never
/// received a verdict (undecodable bytes, recognizer or storage outage).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PhotoStatus {
    Processing,
    Pass,
    Fail,
    Error,
}

impl PhotoStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PhotoStatus::Processing)
    }
}

/// Identifiers recovered from recognized text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azimuth_deg: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azimuth_dir: Option<String>,
}

impl ExtractedFields {
    pub fn has_label_ids(&self) -> bool {
        self.mac_id.is_some() || self.rsn.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overlay every identifier present in `other` onto `self`.
    pub fn merge(&mut self, other: &ExtractedFields) {
        if other.mac_id.is_some() {
            self.mac_id = other.mac_id.clone();
        }
        if other.rsn.is_some() {
            self.rsn = other.rsn.clone();
        }
        if other.azimuth_deg.is_some() {
            self.azimuth_deg = other.azimuth_deg;
            self.azimuth_dir = other.azimuth_dir.clone();
        }
    }
}

/// Metrics computed for a photo. Advisory entries never fail a photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityChecks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skew_deg: Option<f64>,
    #[serde(default)]
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_label_ids: Option<bool>,
    #[serde(default)]
    pub skew_warning: bool,
}

/// One submitted image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Expected type at submission; replaced by the verdict's resolved type.
    pub photo_type: PhotoType,
    /// Job cursor at submission time.
    pub expected_index: usize,
    pub image_key: String,
    pub fingerprint: Option<Fingerprint>,
    pub extracted_text: Option<String>,
    pub fields: ExtractedFields,
    pub checks: QualityChecks,
    pub status: PhotoStatus,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper for inserting the PROCESSING placeholder.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub job_id: Uuid,
    pub photo_type: PhotoType,
    pub expected_index: usize,
    pub image_key: String,
}

impl Photo {
    pub fn from_new(new: NewPhoto) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id: new.job_id,
            photo_type: new.photo_type,
            expected_index: new.expected_index,
            image_key: new.image_key,
            fingerprint: None,
            extracted_text: None,
            fields: ExtractedFields::default(),
            checks: QualityChecks::default(),
            status: PhotoStatus::Processing,
            reasons: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal outcome written onto a photo exactly once.
#[derive(Debug, Clone)]
pub struct PhotoCompletion {
    pub photo_type: PhotoType,
    pub fingerprint: Option<Fingerprint>,
    pub extracted_text: Option<String>,
    pub fields: ExtractedFields,
    pub checks: QualityChecks,
    pub status: PhotoStatus,
    pub reasons: Vec<String>,
}

impl PhotoCompletion {
    /// Completion for a photo that could not be evaluated.
    pub fn error(photo_type: PhotoType, reason: impl Into<String>) -> Self {
        Self {
            photo_type,
            fingerprint: None,
            extracted_text: None,
            fields: ExtractedFields::default(),
            checks: QualityChecks::default(),
            status: PhotoStatus::Error,
            reasons: vec![reason.into()],
        }
    }
}
