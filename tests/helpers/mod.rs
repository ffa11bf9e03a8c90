//! Test doubles and harness for driving the pipeline in-process.
#![allow(dead_code)]

use async_trait::async_trait;
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use site_photo_verify::db::{JobStore, MemoryJobStore, StoreError};
use site_photo_verify::models::job::{Job, NewJob, Thresholds};
use site_photo_verify::models::photo::{
    ExtractedFields, NewPhoto, Photo, PhotoCompletion, PhotoType,
};
use site_photo_verify::services::dedupe::Fingerprint;
use site_photo_verify::services::executor::PipelineExecutor;
use site_photo_verify::services::ocr::{OcrError, TextRecognizer};
use site_photo_verify::services::pipeline::{InboundMessage, PipelineContext};
use site_photo_verify::services::replies::{PromptCatalog, Reply};
use site_photo_verify::services::sealing::ImageSealer;
use site_photo_verify::services::storage::MemoryBlobStore;
use site_photo_verify::services::twilio::{MediaFetcher, Notifier, TransportError};
use uuid::Uuid;

/// Returns the same lines for every image.
pub struct StaticRecognizer(pub Vec<String>);

#[async_trait]
impl TextRecognizer for StaticRecognizer {
    async fn recognize(&self, _image: &DynamicImage) -> Result<Vec<String>, OcrError> {
        Ok(self.0.clone())
    }
}

/// Always reports the recognition backend as down.
pub struct OfflineRecognizer;

#[async_trait]
impl TextRecognizer for OfflineRecognizer {
    async fn recognize(&self, _image: &DynamicImage) -> Result<Vec<String>, OcrError> {
        Err(OcrError::Unavailable("backend offline".to_string()))
    }
}

/// Crashes the task that calls it.
pub struct PanickingRecognizer;

#[async_trait]
impl TextRecognizer for PanickingRecognizer {
    async fn recognize(&self, _image: &DynamicImage) -> Result<Vec<String>, OcrError> {
        panic!("recognizer crashed");
    }
}

/// Serves media registered under a URL.
#[derive(Default)]
pub struct StaticFetcher {
    media: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticFetcher {
    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.media.lock().unwrap().insert(url.to_string(), bytes);
    }
}

#[async_trait]
impl MediaFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.media
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Rejected {
                status: 404,
                detail: url.to_string(),
            })
    }
}

/// Keeps every pushed reply for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Reply)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Reply)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, reply)| reply.body.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, reply: &Reply) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), reply.clone()));
        Ok(())
    }
}

/// Memory store whose cursor writes fail, as if the database dropped out
/// between recording a verdict and moving the job.
pub struct CursorOutageStore(pub Arc<MemoryJobStore>);

#[async_trait]
impl JobStore for CursorOutageStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.0.ping().await
    }

    async fn create_job(&self, new: NewJob) -> Result<Job, StoreError> {
        self.0.create_job(new).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.0.get_job(id).await
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        self.0.list_jobs(limit).await
    }

    async fn find_active_job(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        self.0.find_active_job(worker_id).await
    }

    async fn mark_in_progress(&self, id: Uuid) -> Result<bool, StoreError> {
        self.0.mark_in_progress(id).await
    }

    async fn advance_cursor(
        &self,
        _id: Uuid,
        _from_index: usize,
        _promoted: &ExtractedFields,
    ) -> Result<Option<Job>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn insert_photo(&self, new: NewPhoto) -> Result<Photo, StoreError> {
        self.0.insert_photo(new).await
    }

    async fn complete_photo(
        &self,
        id: Uuid,
        completion: &PhotoCompletion,
    ) -> Result<bool, StoreError> {
        self.0.complete_photo(id, completion).await
    }

    async fn prior_fingerprints(
        &self,
        job_id: Uuid,
        excluding: Uuid,
    ) -> Result<Vec<(PhotoType, Fingerprint)>, StoreError> {
        self.0.prior_fingerprints(job_id, excluding).await
    }

    async fn list_photos(&self, job_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        self.0.list_photos(job_id).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub fetcher: Arc<StaticFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub executor: PipelineExecutor,
}

impl Harness {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self::with_idle_timeout(recognizer, Duration::from_secs(5))
    }

    pub fn with_idle_timeout(recognizer: Arc<dyn TextRecognizer>, idle: Duration) -> Self {
        Self::build(recognizer, idle, |store| store as Arc<dyn JobStore>)
    }

    /// Pipeline writes go through `wrap`; `store` still reads the data directly.
    pub fn with_store(
        recognizer: Arc<dyn TextRecognizer>,
        wrap: impl FnOnce(Arc<MemoryJobStore>) -> Arc<dyn JobStore>,
    ) -> Self {
        Self::build(recognizer, Duration::from_secs(5), wrap)
    }

    fn build(
        recognizer: Arc<dyn TextRecognizer>,
        idle: Duration,
        wrap: impl FnOnce(Arc<MemoryJobStore>) -> Arc<dyn JobStore>,
    ) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let fetcher = Arc::new(StaticFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let ctx = PipelineContext {
            store: wrap(store.clone()),
            blobs: blobs.clone(),
            sealer: Arc::new(ImageSealer::from_key(&[7u8; 32]).unwrap()),
            fetcher: fetcher.clone(),
            notifier: notifier.clone(),
            recognizer,
            catalog: PromptCatalog {
                example_url_label: Some("https://example.test/label.jpg".to_string()),
                example_url_azimuth: None,
            },
        };

        Self {
            store,
            blobs,
            fetcher,
            notifier,
            executor: PipelineExecutor::new(Arc::new(ctx)).with_idle_timeout(idle),
        }
    }

    pub async fn create_job(&self, worker: &str, types: &[&str]) -> Job {
        self.store
            .create_job(NewJob {
                worker_id: worker.to_string(),
                category: None,
                required_types: types.iter().map(|t| PhotoType::new(t)).collect(),
                thresholds: Thresholds::default(),
            })
            .await
            .unwrap()
    }

    pub async fn job(&self, id: Uuid) -> Job {
        self.store.get_job(id).await.unwrap().unwrap()
    }

    /// Register `bytes` under a fresh media URL and build the message for it.
    pub fn photo_message(&self, from: &str, bytes: Vec<u8>) -> InboundMessage {
        let url = format!("https://media.test/{}", Uuid::new_v4());
        self.fetcher.insert(&url, bytes);
        InboundMessage {
            from: from.to_string(),
            num_media: 1,
            media_url: Some(url),
            media_content_type: Some("image/png".to_string()),
        }
    }

    pub fn text_message(&self, from: &str) -> InboundMessage {
        InboundMessage {
            from: from.to_string(),
            ..Default::default()
        }
    }
}
