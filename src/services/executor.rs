use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error};
use uuid::Uuid;

use crate::services::pipeline::{self, PhotoTask, PipelineContext};

type Lanes = Arc<Mutex<HashMap<Uuid, mpsc::UnboundedSender<PhotoTask>>>>;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs photo tasks one job at a time.
///
/// Each job gets its own lane: an unbounded channel drained serially by a
/// dedicated task, so two photos of the same job never race on the cursor
/// while different jobs proceed in parallel. Idle lanes retire themselves.
pub struct PipelineExecutor {
    ctx: Arc<PipelineContext>,
    lanes: Lanes,
    idle_timeout: Duration,
    in_flight: Arc<InFlight>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    drained: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

impl PipelineExecutor {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Queue a photo behind any earlier photos of the same job.
    pub async fn submit(&self, task: PhotoTask) {
        self.in_flight.start();
        let mut lanes = self.lanes.lock().await;

        let task = match lanes.get(&task.job_id) {
            Some(tx) => match tx.send(task) {
                Ok(()) => return,
                // Lane exited without deregistering; replace it below.
                Err(mpsc::error::SendError(task)) => task,
            },
            None => task,
        };

        let job_id = task.job_id;
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(task).is_err() {
            self.in_flight.finish();
            return;
        }
        lanes.insert(job_id, tx);
        debug!(job_id = %job_id, "Opened job lane");

        tokio::spawn(run_lane(
            self.ctx.clone(),
            self.lanes.clone(),
            job_id,
            rx,
            self.idle_timeout,
            self.in_flight.clone(),
        ));
    }

    /// Number of jobs with a live lane.
    pub async fn active_lanes(&self) -> usize {
        self.lanes.lock().await.len()
    }

    /// Wait until every submitted photo has been processed.
    pub async fn wait_idle(&self) {
        loop {
            let drained = self.in_flight.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }
}

async fn run_lane(
    ctx: Arc<PipelineContext>,
    lanes: Lanes,
    job_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<PhotoTask>,
    idle_timeout: Duration,
    in_flight: Arc<InFlight>,
) {
    loop {
        let task = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(task)) => task,
            Ok(None) => break,
            Err(_) => {
                // Retire under the submit lock so nothing is sent to a dead lane.
                let mut guard = lanes.lock().await;
                match rx.try_recv() {
                    Ok(task) => {
                        drop(guard);
                        task
                    }
                    Err(_) => {
                        guard.remove(&job_id);
                        debug!(job_id = %job_id, "Retired idle job lane");
                        break;
                    }
                }
            }
        };

        run_task(&ctx, task).await;
        in_flight.finish();
    }
}

/// Process one photo in its own task so a panic surfaces as a `JoinError`.
async fn run_task(ctx: &Arc<PipelineContext>, task: PhotoTask) {
    let handle = tokio::spawn(pipeline::process_photo(ctx.clone(), task.clone()));
    if let Err(e) = handle.await {
        error!(
            job_id = %task.job_id,
            photo_id = %task.photo_id,
            error = %e,
            "Photo task panicked"
        );
        pipeline::abandon_photo(ctx, &task, e.to_string()).await;
    }
}
