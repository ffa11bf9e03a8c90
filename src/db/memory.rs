use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::photo::{
    ExtractedFields, NewPhoto, Photo, PhotoCompletion, PhotoStatus, PhotoType,
};
use crate::services::dedupe::Fingerprint;

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    /// Insertion order doubles as `created_at` order.
    photos: Vec<Photo>,
}

/// In-process `JobStore` for local runs and tests.
///
/// One lock covers both tables, so every conditional write is atomic in the
/// same way the SQL `UPDATE ... WHERE` statements are.
#[derive(Default)]
pub struct MemoryJobStore {
    tables: Mutex<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let job = Job::from_new(new);
        self.tables.lock().await.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.tables.lock().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let tables = self.tables.lock().await;
        let mut jobs: Vec<Job> = tables.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn find_active_job(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .jobs
            .values()
            .filter(|j| j.worker_id == worker_id && j.status != JobStatus::Done)
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn mark_in_progress(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.jobs.get_mut(&id).is_some_and(|job| job.begin()))
    }

    async fn advance_cursor(
        &self,
        id: Uuid,
        from_index: usize,
        promoted: &ExtractedFields,
    ) -> Result<Option<Job>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if !job.advance_from(from_index) {
            return Ok(None);
        }
        job.promoted_fields.merge(promoted);
        Ok(Some(job.clone()))
    }

    async fn insert_photo(&self, new: NewPhoto) -> Result<Photo, StoreError> {
        let photo = Photo::from_new(new);
        self.tables.lock().await.photos.push(photo.clone());
        Ok(photo)
    }

    async fn complete_photo(
        &self,
        id: Uuid,
        completion: &PhotoCompletion,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(photo) = tables
            .photos
            .iter_mut()
            .find(|p| p.id == id && !p.status.is_terminal())
        else {
            return Ok(false);
        };

        photo.photo_type = completion.photo_type.clone();
        photo.fingerprint = completion.fingerprint;
        photo.extracted_text = completion.extracted_text.clone();
        photo.fields = completion.fields.clone();
        photo.checks = completion.checks.clone();
        photo.status = completion.status;
        photo.reasons = completion.reasons.clone();
        photo.updated_at = Utc::now();
        Ok(true)
    }

    async fn prior_fingerprints(
        &self,
        job_id: Uuid,
        excluding: Uuid,
    ) -> Result<Vec<(PhotoType, Fingerprint)>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .photos
            .iter()
            .filter(|p| p.job_id == job_id && p.id != excluding)
            .filter(|p| matches!(p.status, PhotoStatus::Pass | PhotoStatus::Fail))
            .filter_map(|p| p.fingerprint.map(|fp| (p.photo_type.clone(), fp)))
            .collect())
    }

    async fn list_photos(&self, job_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .photos
            .iter()
            .filter(|p| p.job_id == job_id)
            .cloned()
            .collect())
    }
}
