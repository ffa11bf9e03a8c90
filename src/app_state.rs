use std::sync::Arc;

use crate::config::CategoryTemplates;
use crate::db::JobStore;
use crate::models::job::Thresholds;
use crate::services::executor::PipelineExecutor;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<PipelineExecutor>,
    pub templates: Arc<CategoryTemplates>,
    /// Defaults applied to new jobs before per-job overrides.
    pub thresholds: Thresholds,
}

impl AppState {
    pub fn new(
        executor: PipelineExecutor,
        templates: CategoryTemplates,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            store: executor.context().store.clone(),
            executor: Arc::new(executor),
            templates: Arc::new(templates),
            thresholds,
        }
    }
}
