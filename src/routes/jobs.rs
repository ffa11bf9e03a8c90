use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiError;
use crate::app_state::AppState;
use crate::config::normalize_phone;
use crate::models::job::{Job, NewJob};
use crate::models::photo::PhotoType;
use crate::models::verification::{
    CreateJobRequest, CreateJobResponse, JobResponse, JobTemplateResponse,
};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// POST /api/v1/jobs: Assign a photo checklist to a worker.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    request
        .validate()
        .map_err(|report| ApiError::Invalid(report.to_string()))?;

    let worker_id = normalize_phone(&request.worker_phone);
    if worker_id.is_empty() {
        return Err(ApiError::Invalid("worker_phone is empty".to_string()));
    }

    let required_types = match &request.required_types {
        Some(types) => types.iter().map(|t| PhotoType::new(t)).collect(),
        None => state.templates.required_types(request.category.as_deref()),
    };
    let thresholds = state
        .thresholds
        .with_overrides(&request.thresholds.unwrap_or_default());

    let job = state
        .store
        .create_job(NewJob {
            worker_id,
            category: request.category.clone(),
            required_types,
            thresholds,
        })
        .await?;

    tracing::info!(
        job_id = %job.id,
        worker = %job.worker_id,
        required = job.required_types.len(),
        "Job created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: job.id,
            status: job.status.to_string(),
            required_types: job.required_types,
        }),
    ))
}

/// GET /api/v1/jobs: Most recent jobs.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    Ok(Json(state.store.list_jobs(limit).await?))
}

/// GET /api/v1/jobs/{id}: Job progress with every submitted photo.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .store
        .get_job(job_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let photos = state.store.list_photos(job_id).await?;

    Ok(Json(JobResponse {
        expected_type: job.expected_type().cloned(),
        job,
        photos,
    }))
}

/// GET /api/v1/jobs/templates/{category}: Checklist a category would get.
pub async fn job_template(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Json<JobTemplateResponse> {
    let required_types = state.templates.required_types(Some(&category));
    let labels = required_types.iter().map(PhotoType::display_name).collect();

    Json(JobTemplateResponse {
        category: category.trim().to_uppercase(),
        required_types,
        labels,
    })
}
