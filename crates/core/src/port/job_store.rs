// Job Store Port (Interface)

use crate::domain::{
    ChapterContent, ChapterTask, GenerationJob, JobId, JobStatus, TaskId, TaskStatus,
};
use crate::error::Result;
use async_trait::async_trait;

/// Partial update of a job. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub chapters_completed: Option<u32>,
    pub chapters_failed: Option<u32>,
    pub chapters_in_progress: Option<u32>,
    pub total_words: Option<u64>,
    pub total_tokens: Option<u64>,
    pub total_cost: Option<f64>,
    pub retry_count: Option<u32>,
    pub error_message: Option<String>,
    pub output_files: Option<Vec<String>>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl JobPatch {
    /// Status, error and timestamps of a job that just transitioned.
    pub fn transition(job: &GenerationJob) -> Self {
        Self {
            status: Some(job.status),
            progress: Some(job.progress),
            chapters_in_progress: Some(job.chapters_in_progress),
            error_message: job.error_message.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: Some(job.updated_at),
            ..Default::default()
        }
    }

    /// Counters recorded after a batch.
    pub fn counters(job: &GenerationJob) -> Self {
        Self {
            progress: Some(job.progress),
            chapters_completed: Some(job.chapters_completed),
            chapters_failed: Some(job.chapters_failed),
            chapters_in_progress: Some(job.chapters_in_progress),
            retry_count: Some(job.retry_count),
            updated_at: Some(job.updated_at),
            ..Default::default()
        }
    }

    /// Everything the finalization step writes.
    pub fn finalized(job: &GenerationJob) -> Self {
        Self {
            total_words: Some(job.total_words),
            total_tokens: Some(job.total_tokens),
            total_cost: Some(job.total_cost),
            output_files: Some(job.output_files.clone()),
            ..Self::counters(job).merge(Self::transition(job))
        }
    }

    /// Fields set in `other` win.
    pub fn merge(self, other: JobPatch) -> Self {
        Self {
            status: other.status.or(self.status),
            progress: other.progress.or(self.progress),
            chapters_completed: other.chapters_completed.or(self.chapters_completed),
            chapters_failed: other.chapters_failed.or(self.chapters_failed),
            chapters_in_progress: other.chapters_in_progress.or(self.chapters_in_progress),
            total_words: other.total_words.or(self.total_words),
            total_tokens: other.total_tokens.or(self.total_tokens),
            total_cost: other.total_cost.or(self.total_cost),
            retry_count: other.retry_count.or(self.retry_count),
            error_message: other.error_message.or(self.error_message),
            output_files: other.output_files.or(self.output_files),
            started_at: other.started_at.or(self.started_at),
            completed_at: other.completed_at.or(self.completed_at),
            updated_at: other.updated_at.or(self.updated_at),
        }
    }

    pub fn apply_to(&self, job: &mut GenerationJob) {
        if let Some(v) = self.status {
            job.status = v;
        }
        if let Some(v) = self.progress {
            job.progress = v;
        }
        if let Some(v) = self.chapters_completed {
            job.chapters_completed = v;
        }
        if let Some(v) = self.chapters_failed {
            job.chapters_failed = v;
        }
        if let Some(v) = self.chapters_in_progress {
            job.chapters_in_progress = v;
        }
        if let Some(v) = self.total_words {
            job.total_words = v;
        }
        if let Some(v) = self.total_tokens {
            job.total_tokens = v;
        }
        if let Some(v) = self.total_cost {
            job.total_cost = v;
        }
        if let Some(v) = self.retry_count {
            job.retry_count = v;
        }
        if let Some(v) = &self.error_message {
            job.error_message = Some(v.clone());
        }
        if let Some(v) = &self.output_files {
            job.output_files = v.clone();
        }
        if let Some(v) = self.started_at {
            job.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            job.completed_at = Some(v);
        }
        if let Some(v) = self.updated_at {
            job.updated_at = v;
        }
    }
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub retry_count: Option<u32>,
    pub content: Option<ChapterContent>,
    pub word_count: Option<u32>,
    pub tokens_used: Option<u64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

impl TaskPatch {
    /// Mutable state of a task, as the coordinator persists it.
    pub fn from_task(task: &ChapterTask) -> Self {
        Self {
            status: Some(task.status),
            retry_count: Some(task.retry_count),
            content: task.content.clone(),
            word_count: Some(task.word_count),
            tokens_used: Some(task.tokens_used),
            started_at: task.started_at,
            completed_at: task.completed_at,
            error_message: task.error_message.clone(),
        }
    }

    pub fn apply_to(&self, task: &mut ChapterTask) {
        if let Some(v) = self.status {
            task.status = v;
        }
        if let Some(v) = self.retry_count {
            task.retry_count = v;
        }
        if let Some(v) = &self.content {
            task.content = Some(v.clone());
        }
        if let Some(v) = self.word_count {
            task.word_count = v;
        }
        if let Some(v) = self.tokens_used {
            task.tokens_used = v;
        }
        if let Some(v) = self.started_at {
            task.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            task.completed_at = Some(v);
        }
        if let Some(v) = &self.error_message {
            task.error_message = Some(v.clone());
        }
    }
}

/// Keyed CRUD over jobs and tasks.
///
/// No atomicity is assumed across calls. `update_job` on a job in a terminal
/// state fails with `AppError::InvalidState`; on an unknown id with `NotFound`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &GenerationJob) -> Result<()>;

    async fn update_job(&self, id: &JobId, patch: &JobPatch) -> Result<()>;

    async fn read_job(&self, id: &JobId) -> Result<Option<GenerationJob>>;

    /// Most recent jobs first, optionally filtered by status.
    async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<GenerationJob>>;

    async fn create_tasks(&self, tasks: &[ChapterTask]) -> Result<()>;

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<()>;

    /// Tasks of a job in ascending chapter order.
    async fn read_tasks_by_job(&self, job_id: &JobId) -> Result<Vec<ChapterTask>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory job store with failure injection.
    #[derive(Default)]
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<JobId, GenerationJob>>,
        tasks: Mutex<HashMap<TaskId, ChapterTask>>,
        fail_create_tasks: AtomicBool,
        fail_job_updates_after: Mutex<Option<usize>>,
        job_updates: AtomicUsize,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// `create_tasks` fails with a persistence error.
        pub fn fail_task_creation(&self) {
            self.fail_create_tasks.store(true, Ordering::SeqCst);
        }

        /// Every `update_job` after the first `n` fails with a persistence error.
        pub fn fail_job_updates_after(&self, n: usize) {
            *self.fail_job_updates_after.lock().unwrap() = Some(n);
        }

        pub fn job_count(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }

        pub fn task_count(&self) -> usize {
            self.tasks.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn create_job(&self, job: &GenerationJob) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Persistence(format!("duplicate job id {}", job.id)));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn update_job(&self, id: &JobId, patch: &JobPatch) -> Result<()> {
            let count = self.job_updates.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = *self.fail_job_updates_after.lock().unwrap() {
                if count >= limit {
                    return Err(AppError::Persistence("job store unreachable".to_string()));
                }
            }

            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            if job.status.is_terminal() {
                return Err(AppError::InvalidState(format!(
                    "Job {} is already {}",
                    id, job.status
                )));
            }
            patch.apply_to(job);
            Ok(())
        }

        async fn read_job(&self, id: &JobId) -> Result<Option<GenerationJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn list_jobs(
            &self,
            status: Option<JobStatus>,
            limit: usize,
        ) -> Result<Vec<GenerationJob>> {
            let mut jobs: Vec<GenerationJob> = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| status.map_or(true, |s| j.status == s))
                .cloned()
                .collect();
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
            jobs.truncate(limit);
            Ok(jobs)
        }

        async fn create_tasks(&self, tasks: &[ChapterTask]) -> Result<()> {
            if self.fail_create_tasks.load(Ordering::SeqCst) {
                return Err(AppError::Persistence("task table unavailable".to_string()));
            }
            let mut stored = self.tasks.lock().unwrap();
            for task in tasks {
                stored.insert(task.id.clone(), task.clone());
            }
            Ok(())
        }

        async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<()> {
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;
            patch.apply_to(task);
            Ok(())
        }

        async fn read_tasks_by_job(&self, job_id: &JobId) -> Result<Vec<ChapterTask>> {
            let mut tasks: Vec<ChapterTask> = self
                .tasks
                .lock()
                .unwrap()
                .values()
                .filter(|t| &t.job_id == job_id)
                .cloned()
                .collect();
            tasks.sort_by_key(|t| t.chapter_number);
            Ok(tasks)
        }
    }
}
