//! Inbound photo intake and background verdict processing.
//!
//! Intake is the only work done while the webhook caller waits: resolve the
//! worker's job, fetch and sanity-check the media, seal and store the bytes,
//! and insert a PROCESSING photo. Everything expensive happens later in
//! [`process_photo`], which always leaves the photo in a terminal state.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::normalize_phone;
use crate::db::{JobStore, StoreError};
use crate::models::job::{Job, Thresholds};
use crate::models::photo::{NewPhoto, PhotoCompletion, PhotoType};
use crate::models::verification::Verdict;
use crate::services::executor::PipelineExecutor;
use crate::services::ocr::TextRecognizer;
use crate::services::progression::{self, Decision};
use crate::services::replies::{PromptCatalog, Reply};
use crate::services::sealing::{ImageSealer, SealError};
use crate::services::storage::{self, BlobStore, StorageError};
use crate::services::twilio::{MediaFetcher, Notifier, TransportError};
use crate::services::validation::{self, ValidationError};

/// Collaborators shared by intake and background processing.
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub sealer: Arc<ImageSealer>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub notifier: Arc<dyn Notifier>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub catalog: PromptCatalog,
}

/// Transport-neutral view of one inbound chat message.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub from: String,
    pub num_media: usize,
    pub media_url: Option<String>,
    pub media_content_type: Option<String>,
}

/// Everything the background task needs about an accepted photo.
#[derive(Debug, Clone)]
pub struct PhotoTask {
    pub job_id: Uuid,
    pub photo_id: Uuid,
    pub worker_id: String,
    pub image_key: String,
    pub expected_type: PhotoType,
    /// Job cursor when the photo arrived.
    pub expected_index: usize,
    pub thresholds: Thresholds,
}

/// Result of intake: either an immediate answer, or an acknowledgment plus
/// a photo to evaluate in the background.
#[derive(Debug)]
pub enum Intake {
    Reply(Reply),
    Accepted { reply: Reply, task: PhotoTask },
}

impl Intake {
    pub fn reply(&self) -> &Reply {
        match self {
            Intake::Reply(reply) => reply,
            Intake::Accepted { reply, .. } => reply,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Photo task stopped unexpectedly: {0}")]
    Interrupted(String),
}

impl PipelineError {
    /// Label for the `photo_errors_total` counter.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(ValidationError::Decode(_)) => "decode",
            PipelineError::Validation(ValidationError::Recognition(_)) => "recognition",
            PipelineError::Validation(ValidationError::Interrupted(_)) => "interrupted",
            PipelineError::Store(_) => "store",
            PipelineError::Storage(_) => "storage",
            PipelineError::Seal(_) => "seal",
            PipelineError::Transport(_) => "transport",
            PipelineError::Interrupted(_) => "interrupted",
        }
    }

    fn is_input_error(&self) -> bool {
        matches!(self, PipelineError::Validation(ValidationError::Decode(_)))
    }
}

/// Webhook entry point: run intake, queue accepted photos, return the
/// synchronous reply.
pub async fn handle_inbound(executor: &PipelineExecutor, message: InboundMessage) -> Reply {
    match intake(executor.context(), &message).await {
        Intake::Reply(reply) => reply,
        Intake::Accepted { reply, task } => {
            executor.submit(task).await;
            reply
        }
    }
}

/// Resolve the sender's job and persist the photo placeholder.
pub async fn intake(ctx: &PipelineContext, message: &InboundMessage) -> Intake {
    let worker_id = normalize_phone(&message.from);
    if worker_id.is_empty() {
        return Intake::Reply(ctx.catalog.no_active_job());
    }

    let mut job = match ctx.store.find_active_job(&worker_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            info!(worker = %worker_id, "Inbound message without an active job");
            return Intake::Reply(ctx.catalog.no_active_job());
        }
        Err(e) => {
            error!(worker = %worker_id, error = %e, "Failed to look up active job");
            return Intake::Reply(ctx.catalog.unavailable());
        }
    };

    if job.begin() {
        if let Err(e) = ctx.store.mark_in_progress(job.id).await {
            warn!(job_id = %job.id, error = %e, "Failed to mark job in progress");
        }
    }

    let Some(expected) = job.expected_type().cloned() else {
        return Intake::Reply(ctx.catalog.all_done());
    };

    if message.num_media == 0 {
        return Intake::Reply(ctx.catalog.expect(&expected));
    }

    let content_type = message
        .media_content_type
        .as_deref()
        .unwrap_or("image/jpeg");
    let media_url = match message.media_url.as_deref() {
        Some(url) if !url.trim().is_empty() && content_type.starts_with("image/") => url,
        _ => {
            debug!(job_id = %job.id, content_type, "Rejected non-image media");
            metrics::counter!("photo_errors_total", "kind" => "input").increment(1);
            return Intake::Reply(ctx.catalog.invalid_media(&expected));
        }
    };

    match accept_photo(ctx, &job, &expected, media_url).await {
        Ok(Some(task)) => {
            metrics::counter!("photos_received_total").increment(1);
            info!(
                job_id = %task.job_id,
                photo_id = %task.photo_id,
                worker = %task.worker_id,
                expected_type = %task.expected_type,
                "Photo accepted for verification"
            );
            Intake::Accepted {
                reply: ctx.catalog.received(&expected),
                task,
            }
        }
        Ok(None) => {
            metrics::counter!("photo_errors_total", "kind" => "input").increment(1);
            Intake::Reply(ctx.catalog.invalid_media(&expected))
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Photo intake failed");
            metrics::counter!("photo_errors_total", "kind" => e.kind()).increment(1);
            Intake::Reply(ctx.catalog.retry_later(&expected))
        }
    }
}

/// Fetch, check, seal and store one media item. `Ok(None)` when the bytes
/// are not a recognisable image.
async fn accept_photo(
    ctx: &PipelineContext,
    job: &Job,
    expected: &PhotoType,
    media_url: &str,
) -> Result<Option<PhotoTask>, PipelineError> {
    let bytes = ctx.fetcher.fetch(media_url).await?;

    if image::guess_format(&bytes).is_err() {
        debug!(job_id = %job.id, size = bytes.len(), "Media is not a recognisable image");
        return Ok(None);
    }

    let image_key = storage::new_image_key(job.id, expected);
    let sealed = ctx.sealer.seal(&bytes)?;
    ctx.blobs.put(&image_key, &sealed).await?;

    let photo = ctx
        .store
        .insert_photo(NewPhoto {
            job_id: job.id,
            photo_type: expected.clone(),
            expected_index: job.current_index,
            image_key,
        })
        .await?;

    Ok(Some(PhotoTask {
        job_id: job.id,
        photo_id: photo.id,
        worker_id: job.worker_id.clone(),
        image_key: photo.image_key,
        expected_type: expected.clone(),
        expected_index: job.current_index,
        thresholds: job.thresholds,
    }))
}

/// Evaluate an accepted photo, record the verdict, move the job along and
/// tell the worker. Never returns with the photo still PROCESSING.
pub async fn process_photo(ctx: Arc<PipelineContext>, task: PhotoTask) {
    let start = Instant::now();

    let outcome = match evaluate_photo(&ctx, &task).await {
        Ok(verdict) => apply_verdict(&ctx, &task, verdict).await,
        Err(e) => Err(e),
    };
    if let Err(e) = outcome {
        fail_photo(&ctx, &task, e).await;
    }

    metrics::histogram!("photo_processing_seconds").record(start.elapsed().as_secs_f64());
}

async fn evaluate_photo(ctx: &PipelineContext, task: &PhotoTask) -> Result<Verdict, PipelineError> {
    let sealed = ctx.blobs.get(&task.image_key).await?;
    let bytes = ctx.sealer.open(&sealed)?;
    let prior = ctx
        .store
        .prior_fingerprints(task.job_id, task.photo_id)
        .await?;

    let verdict = validation::evaluate_bytes(
        &bytes,
        Some(&task.expected_type),
        &prior,
        &task.thresholds,
        ctx.recognizer.as_ref(),
    )
    .await?;

    Ok(verdict)
}

async fn apply_verdict(
    ctx: &PipelineContext,
    task: &PhotoTask,
    verdict: Verdict,
) -> Result<(), PipelineError> {
    let completion = PhotoCompletion {
        photo_type: verdict.resolved_type.clone(),
        fingerprint: Some(verdict.fingerprint),
        extracted_text: verdict.extracted_text.clone(),
        fields: verdict.fields.clone(),
        checks: verdict.checks.clone(),
        status: verdict.status,
        reasons: verdict.reasons.clone(),
    };

    if !ctx.store.complete_photo(task.photo_id, &completion).await? {
        debug!(photo_id = %task.photo_id, "Photo already completed, skipping");
        return Ok(());
    }

    metrics::counter!("photo_verdicts_total", "status" => verdict.status.to_string()).increment(1);
    info!(
        job_id = %task.job_id,
        photo_id = %task.photo_id,
        resolved_type = %verdict.resolved_type,
        status = %verdict.status,
        duplicate = verdict.checks.duplicate,
        reasons = ?verdict.reasons,
        "Photo verdict recorded"
    );

    // The verdict is final from here on; a failure below must still answer.
    let reply = match progress_job(ctx, task, &verdict).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return Ok(()),
        Err(e) => {
            metrics::counter!("photo_errors_total", "kind" => e.kind()).increment(1);
            error!(
                job_id = %task.job_id,
                photo_id = %task.photo_id,
                error = %e,
                "Verdict recorded but job was not updated"
            );
            ctx.catalog.retry_later(&task.expected_type)
        }
    };

    notify(ctx, &task.worker_id, &reply).await;
    Ok(())
}

/// Apply a recorded verdict to the job and build the worker's reply.
/// `None` when the job no longer exists.
async fn progress_job(
    ctx: &PipelineContext,
    task: &PhotoTask,
    verdict: &Verdict,
) -> Result<Option<Reply>, PipelineError> {
    let Some(job) = ctx.store.get_job(task.job_id).await? else {
        warn!(job_id = %task.job_id, "Job disappeared before verdict was applied");
        return Ok(None);
    };

    let resolved = &verdict.resolved_type;
    let duplicate = verdict.checks.duplicate;
    let reply = match progression::decide(&job, task.expected_index, verdict.status, resolved) {
        Decision::Advance => {
            let advanced = ctx
                .store
                .advance_cursor(job.id, task.expected_index, &verdict.fields)
                .await?;
            match advanced {
                Some(advanced) => match advanced.expected_type() {
                    Some(next) => ctx.catalog.verified(resolved, next, duplicate),
                    None => {
                        metrics::counter!("jobs_completed_total").increment(1);
                        info!(job_id = %job.id, "All required photos verified");
                        ctx.catalog.completed(duplicate)
                    }
                },
                None => {
                    debug!(job_id = %job.id, "Cursor already advanced, re-prompting");
                    current_prompt(ctx, job.id).await?
                }
            }
        }
        Decision::Retake => {
            let expected = job.expected_type().unwrap_or(&task.expected_type);
            ctx.catalog.failed(resolved, expected, &verdict.reasons)
        }
        Decision::OutOfTurn { expected } => ctx.catalog.out_of_turn(resolved, &expected),
        Decision::Stale => prompt_for(&ctx.catalog, &job),
    };

    Ok(Some(reply))
}

async fn current_prompt(ctx: &PipelineContext, job_id: Uuid) -> Result<Reply, PipelineError> {
    Ok(match ctx.store.get_job(job_id).await? {
        Some(job) => prompt_for(&ctx.catalog, &job),
        None => ctx.catalog.all_done(),
    })
}

fn prompt_for(catalog: &PromptCatalog, job: &Job) -> Reply {
    match job.expected_type() {
        Some(expected) => catalog.expect(expected),
        None => catalog.all_done(),
    }
}

/// Mark a photo that could not be judged as ERROR and ask for a resend.
async fn fail_photo(ctx: &PipelineContext, task: &PhotoTask, err: PipelineError) {
    metrics::counter!("photo_errors_total", "kind" => err.kind()).increment(1);
    error!(
        job_id = %task.job_id,
        photo_id = %task.photo_id,
        kind = err.kind(),
        error = %err,
        "Photo processing failed"
    );

    let reason = if err.is_input_error() {
        "Image could not be decoded"
    } else {
        "Processing error"
    };
    let completion = PhotoCompletion::error(task.expected_type.clone(), reason);
    match ctx.store.complete_photo(task.photo_id, &completion).await {
        Ok(true) => {}
        // A panic after the verdict landed; the worker still needs an answer.
        Ok(false) => debug!(photo_id = %task.photo_id, "Photo kept its earlier outcome"),
        Err(e) => {
            error!(photo_id = %task.photo_id, error = %e, "Failed to mark photo as errored");
        }
    }

    let reply = if err.is_input_error() {
        ctx.catalog.invalid_media(&task.expected_type)
    } else {
        ctx.catalog.retry_later(&task.expected_type)
    };
    notify(ctx, &task.worker_id, &reply).await;
}

/// Called by the executor when the processing task itself died.
pub async fn abandon_photo(ctx: &PipelineContext, task: &PhotoTask, cause: String) {
    fail_photo(ctx, task, PipelineError::Interrupted(cause)).await;
}

async fn notify(ctx: &PipelineContext, to: &str, reply: &Reply) {
    if let Err(e) = ctx.notifier.send(to, reply).await {
        metrics::counter!("notifications_failed_total").increment(1);
        warn!(worker = %to, error = %e, "Failed to deliver reply");
    }
}
