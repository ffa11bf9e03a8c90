use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Job, ThresholdOverrides};
use crate::models::photo::{ExtractedFields, Photo, PhotoStatus, PhotoType, QualityChecks};
use crate::services::dedupe::Fingerprint;

/// Outcome of running the validation pipeline on one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub resolved_type: PhotoType,
    pub fingerprint: Fingerprint,
    pub fields: ExtractedFields,
    pub checks: QualityChecks,
    /// Recognized text, present only when OCR ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// `Pass` iff `reasons` is empty, otherwise `Fail`.
    pub status: PhotoStatus,
    pub reasons: Vec<String>,
}

/// Request to create a worker job.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 3, max = 64))]
    pub worker_phone: String,

    #[garde(length(min = 1, max = 64))]
    pub category: Option<String>,

    #[garde(length(min = 1, max = 32))]
    pub required_types: Option<Vec<String>>,

    #[garde(skip)]
    #[serde(default)]
    pub thresholds: Option<ThresholdOverrides>,
}

/// Response for job queries.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<PhotoType>,
    pub photos: Vec<Photo>,
}

/// Response after creating a job.
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub required_types: Vec<PhotoType>,
}

/// Required types a category would get, with their display names.
#[derive(Debug, Serialize)]
pub struct JobTemplateResponse {
    pub category: String,
    pub required_types: Vec<PhotoType>,
    pub labels: Vec<String>,
}
