// Generation Service - submit, inspect and cancel book generation jobs

pub mod submit;


pub use submit::{GenerationRequest, SubmitDefaults};

use crate::application::assembler::assemble_book;
use crate::application::constants::{CANCELLED_MESSAGE, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};
use crate::application::progress::{ProgressSubscription, ProgressTracker};
use crate::application::scheduler::BatchScheduler;
use crate::domain::{
    AssembledBook, ChapterTask, GenerationJob, JobId, JobStatus, ProgressSnapshot,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobPatch, JobStore, TemplateCatalog, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Entry point for callers: the RPC layer and tests.
///
/// Each submitted job gets its own coordinating tokio task, driven by the
/// shared [`BatchScheduler`].
pub struct GenerationService {
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn TemplateCatalog>,
    scheduler: Arc<BatchScheduler>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    defaults: SubmitDefaults,
    running: Mutex<HashMap<JobId, JoinHandle<JobStatus>>>,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn TemplateCatalog>,
        scheduler: Arc<BatchScheduler>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            catalog,
            scheduler,
            id_provider,
            time_provider,
            defaults: SubmitDefaults {
                concurrency: DEFAULT_CONCURRENCY,
                max_retries: DEFAULT_MAX_RETRIES,
            },
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults(mut self, defaults: SubmitDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        self.scheduler.tracker()
    }

    pub fn catalog(&self) -> &Arc<dyn TemplateCatalog> {
        &self.catalog
    }

    /// Persist a new job with its tasks and start generating in the background.
    ///
    /// Returns as soon as the job is recorded; progress is observable through
    /// [`get_status`](Self::get_status) and the tracker.
    pub async fn submit(&self, req: GenerationRequest) -> Result<JobId> {
        let job = submit::execute(
            self.store.as_ref(),
            self.catalog.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            self.defaults,
            req,
        )
        .await?;

        self.tracker()
            .publish(ProgressSnapshot::from_job(&job, "Queued"));
        self.spawn_driver(job.id.clone());
        Ok(job.id)
    }

    /// Drive an already persisted job (used by recovery).
    pub fn resume(&self, job_id: JobId) {
        self.spawn_driver(job_id);
    }

    fn spawn_driver(&self, job_id: JobId) {
        let scheduler = Arc::clone(&self.scheduler);
        let id = job_id.clone();
        let handle = tokio::spawn(async move { scheduler.drive(&id).await });

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.retain(|_, h| !h.is_finished());
        running.insert(job_id, handle);
    }

    pub async fn get_status(&self, job_id: &JobId) -> Result<GenerationJob> {
        self.store
            .read_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<GenerationJob>> {
        self.store.list_jobs(status, limit).await
    }

    /// Chapter tasks of a job in chapter order.
    pub async fn get_chapters(&self, job_id: &JobId) -> Result<Vec<ChapterTask>> {
        // Distinguish an unknown job from one without tasks
        self.get_status(job_id).await?;
        self.store.read_tasks_by_job(job_id).await
    }

    /// Completed chapters assembled in order, whatever the job's state.
    pub async fn get_book(&self, job_id: &JobId, cost_per_1k_tokens: f64) -> Result<AssembledBook> {
        let job = self.get_status(job_id).await?;
        let tasks = self.store.read_tasks_by_job(job_id).await?;
        Ok(assemble_book(&job, &tasks, cost_per_1k_tokens))
    }

    /// Request cancellation.
    ///
    /// Returns `false` when the job is already terminal. The running batch
    /// finishes; no further batch is scheduled.
    pub async fn cancel(&self, job_id: &JobId) -> Result<bool> {
        let mut job = self.get_status(job_id).await?;
        if job.status.is_terminal() {
            return Ok(false);
        }

        job.cancel(self.time_provider.now_millis(), CANCELLED_MESSAGE)?;
        match self.store.update_job(job_id, &JobPatch::transition(&job)).await {
            Ok(()) => {}
            // Finished between the read and the write
            Err(AppError::InvalidState(_)) => return Ok(false),
            Err(e) => return Err(e),
        }

        self.tracker()
            .publish(ProgressSnapshot::from_job(&job, "Cancelled"));
        info!(job_id = %job_id, "Job cancelled");
        Ok(true)
    }

    /// Latest progress snapshot, falling back to the stored job.
    pub async fn read_progress(&self, job_id: &JobId) -> Result<ProgressSnapshot> {
        if let Some(snapshot) = self.tracker().read(job_id) {
            return Ok(snapshot);
        }
        let job = self.get_status(job_id).await?;
        Ok(ProgressSnapshot::from_job(&job, job.status.as_str()))
    }

    pub fn subscribe(&self, job_id: &str) -> ProgressSubscription {
        self.tracker().subscribe(job_id)
    }

    /// Wait for a job's driver to finish and return the final status.
    ///
    /// For a job this service is not driving, the stored status is returned.
    pub async fn wait(&self, job_id: &JobId) -> Result<JobStatus> {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| AppError::Internal(format!("Driver for job {} failed: {}", job_id, e))),
            None => Ok(self.get_status(job_id).await?.status),
        }
    }

    /// Number of jobs whose driver is still running.
    pub fn active_jobs(&self) -> usize {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.retain(|_, h| !h.is_finished());
        running.len()
    }

    /// Abort every running driver. Their jobs stay non-terminal in the store
    /// and are picked up by recovery on the next start.
    pub fn shutdown(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        for (job_id, handle) in running.drain() {
            if !handle.is_finished() {
                warn!(job_id = %job_id, "Aborting generation on shutdown");
                handle.abort();
            }
        }
    }
}
