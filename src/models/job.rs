use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::photo::{ExtractedFields, PhotoType};

/// Lifecycle of a worker's checklist run. Only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
}

/// Per-job validation thresholds, resolved at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    /// Minimum Laplacian variance for a photo to count as sharp.
    pub blur_min: f64,
    /// Maximum fingerprint distance still treated as a resend.
    pub dup_hamming_max: u32,
    /// Label skew (degrees) above which an unreadable label fails.
    pub label_skew_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            blur_min: 140.0,
            dup_hamming_max: 5,
            label_skew_max: 20.0,
        }
    }
}

/// Optional per-job overrides supplied when a job is created.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    pub blur_min: Option<f64>,
    pub dup_hamming_max: Option<u32>,
    pub label_skew_max: Option<f64>,
}

impl Thresholds {
    pub fn with_overrides(self, overrides: &ThresholdOverrides) -> Self {
        Self {
            blur_min: overrides.blur_min.unwrap_or(self.blur_min),
            dup_hamming_max: overrides.dup_hamming_max.unwrap_or(self.dup_hamming_max),
            label_skew_max: overrides.label_skew_max.unwrap_or(self.label_skew_max),
        }
    }
}

/// One worker's ordered checklist of required photos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub worker_id: String,
    pub category: Option<String>,
    pub required_types: Vec<PhotoType>,
    pub current_index: usize,
    pub status: JobStatus,
    /// Identifiers lifted from passing photos (MAC, RSN, azimuth).
    pub promoted_fields: ExtractedFields,
    pub thresholds: Thresholds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper for inserting job records.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub worker_id: String,
    pub category: Option<String>,
    pub required_types: Vec<PhotoType>,
    pub thresholds: Thresholds,
}

impl Job {
    /// Build the in-memory representation of a freshly created job.
    pub fn from_new(new: NewJob) -> Self {
        let now = Utc::now();
        let status = if new.required_types.is_empty() {
            JobStatus::Done
        } else {
            JobStatus::Pending
        };
        Self {
            id: Uuid::new_v4(),
            worker_id: new.worker_id,
            category: new.category,
            required_types: new.required_types,
            current_index: 0,
            status,
            promoted_fields: ExtractedFields::default(),
            thresholds: new.thresholds,
            created_at: now,
            updated_at: now,
        }
    }
}
