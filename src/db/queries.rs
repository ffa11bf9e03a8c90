use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::job::{Job, JobStatus, NewJob, Thresholds};
use crate::models::photo::{
    ExtractedFields, NewPhoto, Photo, PhotoCompletion, PhotoStatus, PhotoType, QualityChecks,
};
use crate::services::dedupe::Fingerprint;

const JOB_COLUMNS: &str = "id, worker_id, category, required_types, current_index, status, \
                           promoted_fields, thresholds, created_at, updated_at";

const PHOTO_COLUMNS: &str = "id, job_id, photo_type, expected_index, image_key, fingerprint, \
                             extracted_text, fields, checks, status, reasons, \
                             created_at, updated_at";

/// `JobStore` backed by the `jobs` and `photos` tables.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn index_from_db(value: i32) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative index {}", value)))
}

fn index_to_db(value: usize) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("index {} out of range", value)))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|_| StoreError::Corrupt(format!("unknown job status {}", status)))?;
    let required_types: Vec<String> = row.try_get("required_types")?;
    let promoted: Json<ExtractedFields> = row.try_get("promoted_fields")?;
    let thresholds: Json<Thresholds> = row.try_get("thresholds")?;

    Ok(Job {
        id: row.try_get("id")?,
        worker_id: row.try_get("worker_id")?,
        category: row.try_get("category")?,
        required_types: required_types.into_iter().map(PhotoType::from).collect(),
        current_index: index_from_db(row.try_get("current_index")?)?,
        status,
        promoted_fields: promoted.0,
        thresholds: thresholds.0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn photo_from_row(row: &PgRow) -> Result<Photo, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<PhotoStatus>()
        .map_err(|_| StoreError::Corrupt(format!("unknown photo status {}", status)))?;
    let photo_type: String = row.try_get("photo_type")?;
    let fingerprint = parse_fingerprint(row.try_get("fingerprint")?)?;
    let fields: Json<ExtractedFields> = row.try_get("fields")?;
    let checks: Json<QualityChecks> = row.try_get("checks")?;

    Ok(Photo {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        photo_type: PhotoType::from(photo_type),
        expected_index: index_from_db(row.try_get("expected_index")?)?,
        image_key: row.try_get("image_key")?,
        fingerprint,
        extracted_text: row.try_get("extracted_text")?,
        fields: fields.0,
        checks: checks.0,
        status,
        reasons: row.try_get("reasons")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_fingerprint(raw: Option<String>) -> Result<Option<Fingerprint>, StoreError> {
    raw.map(|hex| {
        hex.parse::<Fingerprint>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    })
    .transpose()
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let job = Job::from_new(new);
        let types: Vec<String> = job.required_types.iter().map(|t| t.to_string()).collect();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs (id, worker_id, category, required_types, current_index, status,
                              promoted_fields, thresholds, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8, $8)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.id)
        .bind(&job.worker_id)
        .bind(&job.category)
        .bind(&types)
        .bind(job.status.as_ref())
        .bind(Json(&job.promoted_fields))
        .bind(Json(&job.thresholds))
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn find_active_job(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE worker_id = $1 AND status <> 'DONE'
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn mark_in_progress(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'IN_PROGRESS', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn advance_cursor(
        &self,
        id: Uuid,
        from_index: usize,
        promoted: &ExtractedFields,
    ) -> Result<Option<Job>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut job = job_from_row(&row)?;
        // Dropping the transaction releases the row lock untouched.
        if !job.advance_from(from_index) {
            return Ok(None);
        }
        job.promoted_fields.merge(promoted);

        sqlx::query(
            r#"
            UPDATE jobs
            SET current_index = $2, status = $3, promoted_fields = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(index_to_db(job.current_index)?)
        .bind(job.status.as_ref())
        .bind(Json(&job.promoted_fields))
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(job))
    }

    async fn insert_photo(&self, new: NewPhoto) -> Result<Photo, StoreError> {
        let photo = Photo::from_new(new);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO photos (id, job_id, photo_type, expected_index, image_key, status,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {PHOTO_COLUMNS}
            "#
        ))
        .bind(photo.id)
        .bind(photo.job_id)
        .bind(photo.photo_type.as_str())
        .bind(index_to_db(photo.expected_index)?)
        .bind(&photo.image_key)
        .bind(photo.status.as_ref())
        .bind(photo.created_at)
        .fetch_one(&self.pool)
        .await?;

        photo_from_row(&row)
    }

    async fn complete_photo(
        &self,
        id: Uuid,
        completion: &PhotoCompletion,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE photos
            SET photo_type = $2,
                fingerprint = $3,
                extracted_text = $4,
                fields = $5,
                checks = $6,
                status = $7,
                reasons = $8,
                updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(completion.photo_type.as_str())
        .bind(completion.fingerprint.map(|fp| fp.to_string()))
        .bind(&completion.extracted_text)
        .bind(Json(&completion.fields))
        .bind(Json(&completion.checks))
        .bind(completion.status.as_ref())
        .bind(&completion.reasons)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn prior_fingerprints(
        &self,
        job_id: Uuid,
        excluding: Uuid,
    ) -> Result<Vec<(PhotoType, Fingerprint)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT photo_type, fingerprint
            FROM photos
            WHERE job_id = $1
              AND id <> $2
              AND status IN ('PASS', 'FAIL')
              AND fingerprint IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .bind(excluding)
        .fetch_all(&self.pool)
        .await?;

        let mut prior = Vec::with_capacity(rows.len());
        for row in &rows {
            let photo_type: String = row.try_get("photo_type")?;
            if let Some(fp) = parse_fingerprint(row.try_get("fingerprint")?)? {
                prior.push((PhotoType::from(photo_type), fp));
            }
        }
        Ok(prior)
    }

    async fn list_photos(&self, job_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE job_id = $1 ORDER BY created_at ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(photo_from_row).collect()
    }
}
