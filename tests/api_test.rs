//! HTTP handler tests: job creation, templates and the webhook, served from
//! the in-memory store.
//!
//! Run with: cargo test --test api_test

mod fixtures;
mod helpers;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use fixtures::*;
use helpers::*;
use std::sync::Arc;
use uuid::Uuid;

use site_photo_verify::app_state::AppState;
use site_photo_verify::config::CategoryTemplates;
use site_photo_verify::db::{JobStore, MemoryJobStore};
use site_photo_verify::models::job::{JobStatus, ThresholdOverrides, Thresholds};
use site_photo_verify::models::photo::PhotoType;
use site_photo_verify::models::verification::CreateJobRequest;
use site_photo_verify::routes::jobs::{self, ListParams};
use site_photo_verify::routes::whatsapp::{self, TwilioInbound};
use site_photo_verify::routes::ApiError;

fn app() -> (AppState, Arc<MemoryJobStore>) {
    let Harness { store, executor, .. } =
        Harness::new(Arc::new(StaticRecognizer(readable_text())));
    let templates = CategoryTemplates::parse("TOWER=TOWER,LABEL").unwrap();
    (AppState::new(executor, templates, Thresholds::default()), store)
}

fn request(worker_phone: &str) -> CreateJobRequest {
    CreateJobRequest {
        worker_phone: worker_phone.to_string(),
        category: None,
        required_types: None,
        thresholds: None,
    }
}

#[tokio::test]
async fn test_create_job_applies_threshold_overrides() {
    let (state, store) = app();
    let body = CreateJobRequest {
        required_types: Some(vec!["label".to_string()]),
        thresholds: Some(ThresholdOverrides {
            blur_min: Some(60.0),
            dup_hamming_max: None,
            label_skew_max: Some(8.0),
        }),
        ..request("whatsapp:+91 12345 67890")
    };

    let (status, Json(created)) = jobs::create_job(State(state), Json(body)).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.status, "PENDING");
    assert_eq!(created.required_types, vec![PhotoType::label()]);

    let job = store.get_job(created.job_id).await.unwrap().unwrap();
    assert_eq!(job.worker_id, WORKER);
    assert_eq!(job.thresholds.blur_min, 60.0);
    assert_eq!(job.thresholds.label_skew_max, 8.0);
    // Untouched fields keep the service default
    assert_eq!(job.thresholds.dup_hamming_max, Thresholds::default().dup_hamming_max);
}

#[tokio::test]
async fn test_create_job_falls_back_to_category_template() {
    let (state, _) = app();

    let body = CreateJobRequest {
        category: Some("tower".to_string()),
        ..request(WORKER)
    };
    let (_, Json(created)) = jobs::create_job(State(state.clone()), Json(body)).await.unwrap();
    assert_eq!(created.required_types, vec![PhotoType::new("TOWER"), PhotoType::label()]);

    // Unknown category gets the default checklist
    let body = CreateJobRequest {
        category: Some("unlisted".to_string()),
        ..request(WORKER)
    };
    let (_, Json(created)) = jobs::create_job(State(state), Json(body)).await.unwrap();
    assert_eq!(created.required_types, vec![PhotoType::label(), PhotoType::azimuth()]);
}

#[tokio::test]
async fn test_create_job_rejects_invalid_request() {
    let (state, store) = app();

    let err = jobs::create_job(State(state.clone()), Json(request("12")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Invalid(_)));
    assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = CreateJobRequest {
        required_types: Some(Vec::new()),
        ..request(WORKER)
    };
    let err = jobs::create_job(State(state.clone()), Json(body)).await.unwrap_err();
    assert!(matches!(err, ApiError::Invalid(_)));

    // Passes length checks but normalizes to nothing
    let err = jobs::create_job(State(state), Json(request("whatsapp:   ")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Invalid(_)));

    assert!(store.list_jobs(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_job_template_lookup() {
    let (state, _) = app();

    let Json(template) = jobs::job_template(State(state.clone()), Path("tower".to_string())).await;
    assert_eq!(template.category, "TOWER");
    assert_eq!(template.required_types, vec![PhotoType::new("TOWER"), PhotoType::label()]);
    assert_eq!(template.labels, vec!["Tower Photo", "Label Photo"]);

    let Json(template) = jobs::job_template(State(state), Path("fiber".to_string())).await;
    assert_eq!(template.required_types, vec![PhotoType::label()]);
}

#[tokio::test]
async fn test_get_and_list_jobs() {
    let (state, _) = app();
    let (_, Json(created)) = jobs::create_job(State(state.clone()), Json(request(WORKER)))
        .await
        .unwrap();

    let Json(found) = jobs::get_job(State(state.clone()), Path(created.job_id))
        .await
        .unwrap();
    assert_eq!(found.job.status, JobStatus::Pending);
    assert_eq!(found.expected_type, Some(PhotoType::label()));
    assert!(found.photos.is_empty());

    let Json(listed) = jobs::list_jobs(State(state.clone()), Query(ListParams { limit: None }))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let err = jobs::get_job(State(state), Path(Uuid::new_v4())).await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_answers_with_twiml() {
    let (state, store) = app();
    let (_, Json(created)) = jobs::create_job(State(state.clone()), Json(request(WORKER)))
        .await
        .unwrap();

    let form = TwilioInbound {
        from: Some(format!("whatsapp:{}", WORKER)),
        num_media: Some("0".to_string()),
        ..Default::default()
    };
    let response = whatsapp::webhook(State(state), Form(form)).await.into_response();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message><Body>"));
    assert!(xml.contains("*Label Photo* with MAC &amp; RSN"));
    assert!(xml.contains("<Media>https://example.test/label.jpg</Media>"));

    // First contact starts the job
    let job = store.get_job(created.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
}

#[tokio::test]
async fn test_webhook_unknown_worker() {
    let (state, _) = app();
    let form = TwilioInbound {
        wa_id: Some("15550001111".to_string()),
        ..Default::default()
    };
    let response = whatsapp::webhook(State(state), Form(form)).await.into_response();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.contains("<Body>No active job assigned yet."));
    assert!(!xml.contains("<Media>"));
}
