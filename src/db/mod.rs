use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Job, NewJob};
use crate::models::photo::{ExtractedFields, NewPhoto, Photo, PhotoCompletion, PhotoType};
use crate::services::dedupe::Fingerprint;

pub mod memory;
pub mod queries;

pub use memory::MemoryJobStore;
pub use queries::PgJobStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Persistence for jobs and photos.
///
/// Every mutation that the checklist invariants depend on is conditional:
/// `mark_in_progress` only from PENDING, `advance_cursor` only from the
/// given index, `complete_photo` only from PROCESSING. A condition that no
/// longer holds is reported as `false`/`None`, never as an error.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Round-trip to the backing store for health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_job(&self, new: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Most recent jobs first.
    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Oldest job for `worker_id` that is not DONE.
    async fn find_active_job(&self, worker_id: &str) -> Result<Option<Job>, StoreError>;

    /// PENDING → IN_PROGRESS. Returns whether the row changed.
    async fn mark_in_progress(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Increment the cursor iff it is still at `from_index`, merging the
    /// identifiers present in `promoted` into the job in the same write;
    /// DONE when the checklist is exhausted. `None` when the race was lost,
    /// in which case nothing is promoted either.
    async fn advance_cursor(
        &self,
        id: Uuid,
        from_index: usize,
        promoted: &ExtractedFields,
    ) -> Result<Option<Job>, StoreError>;

    async fn insert_photo(&self, new: NewPhoto) -> Result<Photo, StoreError>;

    /// Write the terminal outcome iff the photo is still PROCESSING.
    async fn complete_photo(
        &self,
        id: Uuid,
        completion: &PhotoCompletion,
    ) -> Result<bool, StoreError>;

    /// Fingerprints of the job's judged (PASS/FAIL) photos, oldest first.
    async fn prior_fingerprints(
        &self,
        job_id: Uuid,
        excluding: Uuid,
    ) -> Result<Vec<(PhotoType, Fingerprint)>, StoreError>;

    async fn list_photos(&self, job_id: Uuid) -> Result<Vec<Photo>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored record is malformed: {0}")]
    Corrupt(String),
}
