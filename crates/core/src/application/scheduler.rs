//! Batch scheduler - drives one job from `pending` to a terminal state
//!
//! Tasks run in batches of `job.concurrency`; batch N+1 starts only after
//! every task of batch N is terminal. The coordinator (this module) performs
//! every store and tracker write. Task futures only talk to the generator.
//!
//! Cancellation is cooperative: the job is re-read at each batch boundary and
//! the store refuses writes to a terminal job, which ends the run.

use crate::application::assembler::{assemble_book, failure_summary};
use crate::application::constants::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_RETRY_DELAY};
use crate::application::progress::ProgressTracker;
use crate::application::retry::RetryPolicy;
use crate::domain::{ChapterTask, GenerationJob, JobId, JobStatus, ProgressSnapshot, TaskStatus};
use crate::error::{AppError, Result};
use crate::port::{BookExporter, ContentGenerator, JobPatch, JobStore, TaskPatch, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Scheduler tuning shared by every job.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    /// Cost accounting; zero disables it.
    pub cost_per_1k_tokens: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            cost_per_1k_tokens: 0.0,
        }
    }
}

/// Result of a store write against a job that may have been terminated.
enum JobWrite {
    Written,
    Terminated,
}

pub struct BatchScheduler {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn ContentGenerator>,
    tracker: Arc<ProgressTracker>,
    exporter: Option<Arc<dyn BookExporter>>,
    time_provider: Arc<dyn TimeProvider>,
    retry_policy: Arc<RetryPolicy>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn ContentGenerator>,
        tracker: Arc<ProgressTracker>,
        time_provider: Arc<dyn TimeProvider>,
        config: SchedulerConfig,
    ) -> Self {
        let retry_policy = Arc::new(RetryPolicy::new(config.retry_delay, config.attempt_timeout));
        Self {
            store,
            generator,
            tracker,
            exporter: None,
            time_provider,
            retry_policy,
            config,
        }
    }

    /// Export finalized books through `exporter`.
    pub fn with_exporter(mut self, exporter: Arc<dyn BookExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Drive a job and never return an error: anything that escapes the run
    /// marks the job `failed`.
    ///
    /// Returns the status the job ended in.
    pub async fn drive(&self, job_id: &JobId) -> JobStatus {
        match self.run(job_id).await {
            Ok(status) => status,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Generation aborted");
                self.mark_failed(job_id, &e.to_string()).await;
                JobStatus::Failed
            }
        }
    }

    /// Run every batch of a job, then finalize it.
    pub async fn run(&self, job_id: &JobId) -> Result<JobStatus> {
        let mut job = self
            .store
            .read_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = %job.status, "Job already terminal, nothing to run");
            return Ok(job.status);
        }

        // Counters start from the task records, so a resumed job picks up
        // where its last persisted batch left off
        let (mut completed, mut failed, mut retries) = (0u32, 0u32, 0u32);
        let mut tasks = Vec::new();
        for mut task in self.store.read_tasks_by_job(job_id).await? {
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                _ => {
                    // An attempt interrupted by a restart starts over
                    task.status = TaskStatus::Pending;
                    tasks.push(task);
                    continue;
                }
            }
            retries += task.retry_count;
        }

        // A job persisted without all of its tasks must not finish as a success
        let recorded = tasks.len() as u32 + completed + failed;
        if recorded != job.chapters_total {
            return Err(AppError::Persistence(format!(
                "Job {} has {} of {} chapter tasks recorded",
                job_id, recorded, job.chapters_total
            )));
        }

        let concurrency = job.concurrency.max(1);
        let total_batches = tasks.len().div_ceil(concurrency);

        info!(
            job_id = %job_id,
            chapters = tasks.len(),
            concurrency,
            batches = total_batches,
            "Starting generation"
        );

        for (index, batch) in tasks.chunks(concurrency).enumerate() {
            let batch_number = index + 1;

            // Batch boundary: honour a cancellation that happened meanwhile
            let current = self.current_status(job_id).await?;
            if current.is_terminal() {
                info!(job_id = %job_id, status = %current, batch = batch_number, "Job terminated, stopping");
                return Ok(current);
            }

            if job.status == JobStatus::Pending {
                if let JobWrite::Terminated = self.start_job(&mut job).await? {
                    return self.current_status(job_id).await;
                }
            }

            let now = self.time_provider.now_millis();
            let mut started = Vec::with_capacity(batch.len());
            for task in batch {
                let mut task = task.clone();
                task.begin_attempt(now)?;
                self.store
                    .update_task(&task.id, &TaskPatch::from_task(&task))
                    .await?;
                started.push(task);
            }

            job.chapters_in_progress = started.len() as u32;
            job.updated_at = now;
            let in_progress = JobPatch {
                chapters_in_progress: Some(job.chapters_in_progress),
                updated_at: Some(now),
                ..Default::default()
            };
            if let JobWrite::Terminated = self.write_job(job_id, &in_progress).await? {
                return self.current_status(job_id).await;
            }

            debug!(job_id = %job_id, batch = batch_number, size = started.len(), "Batch started");
            let finished = self.execute_batch(started).await;

            for task in &finished {
                self.store
                    .update_task(&task.id, &TaskPatch::from_task(task))
                    .await?;
                match task.status {
                    TaskStatus::Completed => completed += 1,
                    TaskStatus::Failed => failed += 1,
                    _ => {}
                }
                retries += task.retry_count;
            }

            let now = self.time_provider.now_millis();
            job.record_batch(completed, failed, retries, now)?;

            let estimate = self.tracker.estimate_completion(
                completed,
                job.chapters_total,
                job.started_at.unwrap_or(now),
            );
            self.tracker.publish(
                ProgressSnapshot::from_job(
                    &job,
                    format!("Batch {}/{} finished", batch_number, total_batches),
                )
                .with_estimate(estimate),
            );

            if let JobWrite::Terminated = self.write_job(job_id, &JobPatch::counters(&job)).await? {
                return self.current_status(job_id).await;
            }

            info!(
                job_id = %job_id,
                batch = batch_number,
                batches = total_batches,
                completed,
                failed,
                progress = job.progress,
                "Batch finished"
            );
        }

        self.finalize(&mut job).await
    }

    /// Run one batch to completion. Output is sorted by chapter number.
    ///
    /// A task lost to a join error (the runtime shutting down, or a panic
    /// outside the guarded generator call) is returned as failed.
    async fn execute_batch(&self, batch: Vec<ChapterTask>) -> Vec<ChapterTask> {
        let mut set = JoinSet::new();
        for task in batch.iter().cloned() {
            let generator = Arc::clone(&self.generator);
            let policy = Arc::clone(&self.retry_policy);
            let time_provider = Arc::clone(&self.time_provider);
            set.spawn(async move {
                policy
                    .run(generator.as_ref(), task, time_provider.as_ref())
                    .await
            });
        }

        let mut finished = Vec::with_capacity(batch.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(task) => finished.push(task),
                Err(e) => error!(error = %e, "Chapter task did not complete"),
            }
        }

        if finished.len() < batch.len() {
            let now = self.time_provider.now_millis();
            for mut lost in batch {
                if finished.iter().any(|t| t.id == lost.id) {
                    continue;
                }
                lost.status = TaskStatus::Failed;
                lost.error_message = Some("Chapter task aborted".to_string());
                lost.completed_at = Some(now);
                finished.push(lost);
            }
        }

        finished.sort_by_key(|t| t.chapter_number);
        finished
    }

    async fn start_job(&self, job: &mut GenerationJob) -> Result<JobWrite> {
        job.start(self.time_provider.now_millis())?;
        let write = self.write_job(&job.id, &JobPatch::transition(job)).await?;
        if let JobWrite::Written = write {
            let estimate = self.tracker.estimate_completion(0, job.chapters_total, job.updated_at);
            self.tracker.publish(
                ProgressSnapshot::from_job(job, "Generating chapters").with_estimate(estimate),
            );
        }
        Ok(write)
    }

    /// Assemble, export and complete the job.
    async fn finalize(&self, job: &mut GenerationJob) -> Result<JobStatus> {
        let current = self.current_status(&job.id).await?;
        if current.is_terminal() {
            return Ok(current);
        }
        if job.status == JobStatus::Pending {
            if let JobWrite::Terminated = self.start_job(job).await? {
                return self.current_status(&job.id).await;
            }
        }

        let tasks = self.store.read_tasks_by_job(&job.id).await?;
        let book = assemble_book(job, &tasks, self.config.cost_per_1k_tokens);

        job.output_files = match &self.exporter {
            Some(exporter) if !book.chapters.is_empty() => exporter.export(&book).await?,
            _ => Vec::new(),
        };
        job.total_words = book.total_words;
        job.total_tokens = book.total_tokens;
        job.total_cost = book.total_cost;

        let summary = failure_summary(&book.failed_chapters, job.chapters_total);
        if let Some(summary) = &summary {
            warn!(job_id = %job.id, summary = %summary, "Book completed with failed chapters");
        }
        job.complete(self.time_provider.now_millis(), summary)?;

        if let JobWrite::Terminated = self.write_job(&job.id, &JobPatch::finalized(job)).await? {
            return self.current_status(&job.id).await;
        }

        self.tracker
            .publish(ProgressSnapshot::from_job(job, "Completed"));
        info!(
            job_id = %job.id,
            chapters = book.chapters.len(),
            failed = book.failed_chapters.len(),
            words = job.total_words,
            tokens = job.total_tokens,
            files = job.output_files.len(),
            "Book generation completed"
        );
        Ok(JobStatus::Completed)
    }

    /// Best-effort: record an escaped error on a job that is not yet terminal.
    pub async fn mark_failed(&self, job_id: &JobId, message: &str) {
        let mut job = match self.store.read_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Cannot read job to mark it failed");
                return;
            }
        };
        if job.fail(self.time_provider.now_millis(), message).is_err() {
            return;
        }
        self.release_started_tasks(job_id).await;
        match self.store.update_job(job_id, &JobPatch::transition(&job)).await {
            Ok(()) => {
                self.tracker.publish(ProgressSnapshot::from_job(&job, "Failed"));
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to persist job failure");
            }
        }
    }

    /// Put tasks left `generating` or `retrying` by an aborted batch back to
    /// `pending`, so a failed job never shows chapters as still running.
    async fn release_started_tasks(&self, job_id: &JobId) {
        let tasks = match self.store.read_tasks_by_job(job_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Cannot read tasks to release them");
                return;
            }
        };
        let pending = TaskPatch {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        for task in tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Generating | TaskStatus::Retrying))
        {
            if let Err(e) = self.store.update_task(&task.id, &pending).await {
                error!(task_id = %task.id, error = %e, "Failed to release task");
            }
        }
    }

    async fn write_job(&self, job_id: &JobId, patch: &JobPatch) -> Result<JobWrite> {
        match self.store.update_job(job_id, patch).await {
            Ok(()) => Ok(JobWrite::Written),
            Err(AppError::InvalidState(reason)) => {
                debug!(job_id = %job_id, reason = %reason, "Job terminated by another writer");
                Ok(JobWrite::Terminated)
            }
            Err(e) => Err(e),
        }
    }

    async fn current_status(&self, job_id: &JobId) -> Result<JobStatus> {
        self.store
            .read_job(job_id)
            .await?
            .map(|j| j.status)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }
}
