// Startup recovery of jobs interrupted by a daemon restart
use crate::application::generation::GenerationService;
use crate::domain::JobStatus;
use crate::port::{JobPatch, JobStore, TimeProvider};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Upper bound on jobs inspected per status at startup
const RECOVERY_SCAN_LIMIT: usize = 1000;

/// Message recorded on interrupted jobs that are not resumed
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by daemon restart";

/// What to do with a job that was pending or generating when the daemon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Restart the driver; completed chapters are kept.
    Resume,
    /// Mark the job failed.
    Fail,
}

/// Crash recovery service
///
/// On daemon startup, finds jobs left non-terminal by the previous process.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
    service: Arc<GenerationService>,
    time_provider: Arc<dyn TimeProvider>,
    mode: RecoveryMode,
}

impl RecoveryService {
    pub fn new(
        store: Arc<dyn JobStore>,
        service: Arc<GenerationService>,
        time_provider: Arc<dyn TimeProvider>,
        mode: RecoveryMode,
    ) -> Self {
        Self {
            store,
            service,
            time_provider,
            mode,
        }
    }

    /// Resume or fail every interrupted job.
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_interrupted_jobs(&self) -> crate::error::Result<usize> {
        info!(mode = ?self.mode, "Starting interrupted job recovery");

        let mut interrupted = self
            .store
            .list_jobs(Some(JobStatus::Generating), RECOVERY_SCAN_LIMIT)
            .await?;
        interrupted.extend(
            self.store
                .list_jobs(Some(JobStatus::Pending), RECOVERY_SCAN_LIMIT)
                .await?,
        );

        let mut recovered_count = 0;
        for mut job in interrupted {
            match self.mode {
                RecoveryMode::Resume => {
                    info!(
                        job_id = %job.id,
                        status = %job.status,
                        completed = job.chapters_completed,
                        total = job.chapters_total,
                        "Resuming interrupted job"
                    );
                    self.service.resume(job.id.clone());
                    recovered_count += 1;
                }
                RecoveryMode::Fail => {
                    if let Err(e) = job.fail(self.time_provider.now_millis(), INTERRUPTED_MESSAGE) {
                        warn!(job_id = %job.id, error = %e, "Cannot fail interrupted job");
                        continue;
                    }
                    match self.store.update_job(&job.id, &JobPatch::transition(&job)).await {
                        Ok(()) => {
                            info!(job_id = %job.id, "Interrupted job marked as FAILED");
                            recovered_count += 1;
                        }
                        Err(e) => {
                            error!(job_id = %job.id, error = %e, "Failed to mark interrupted job");
                        }
                    }
                }
            }
        }

        info!(recovered_count = %recovered_count, "Interrupted job recovery complete");
        Ok(recovered_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::decomposer::decompose;
    use crate::application::progress::ProgressTracker;
    use crate::application::scheduler::BatchScheduler;
    use crate::application::test_support::{fast_config, five_chapter_template};
    use crate::domain::{ChapterContent, GeneratedChapter, GenerationJob, TaskStatus};
    use crate::port::content_generator::mocks::MockContentGenerator;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::{InMemoryTemplateCatalog, TaskPatch};

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        generator: Arc<MockContentGenerator>,
        service: Arc<GenerationService>,
        clock: Arc<ManualTimeProvider>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryJobStore::new());
        let generator = Arc::new(MockContentGenerator::new_success());
        let clock = Arc::new(ManualTimeProvider::new(5_000));
        let tracker = Arc::new(ProgressTracker::new(clock.clone()));

        let mut catalog = InMemoryTemplateCatalog::builtin();
        catalog.extend(vec![five_chapter_template()]);

        let scheduler = BatchScheduler::new(
            store.clone(),
            generator.clone(),
            tracker,
            clock.clone(),
            fast_config(),
        );
        let service = Arc::new(GenerationService::new(
            store.clone(),
            Arc::new(catalog),
            Arc::new(scheduler),
            Arc::new(SequentialIdProvider::default()),
            clock.clone(),
        ));

        Fixture {
            store,
            generator,
            service,
            clock,
        }
    }

    fn recovery(f: &Fixture, mode: RecoveryMode) -> RecoveryService {
        RecoveryService::new(f.store.clone(), f.service.clone(), f.clock.clone(), mode)
    }

    /// Job left `generating` by a restart: chapter 1 done, chapter 2 mid-attempt.
    async fn seed_interrupted_job(store: &InMemoryJobStore, id: &str) {
        let template = five_chapter_template();
        let mut job = GenerationJob::new(
            id,
            1_000,
            "ssw",
            template.id.as_str(),
            template.name.as_str(),
            50,
            5,
            2,
            1,
        );
        store.create_job(&job).await.unwrap();
        let tasks = decompose(&template, &job);
        store.create_tasks(&tasks).await.unwrap();

        job.start(2_000).unwrap();
        store
            .update_job(&job.id, &JobPatch::transition(&job))
            .await
            .unwrap();

        let mut done = tasks[0].clone();
        let title = done.title.clone();
        done.begin_attempt(2_000).unwrap();
        done.complete(
            GeneratedChapter {
                content: ChapterContent {
                    title,
                    summary: "one two three".to_string(),
                    sections: vec![],
                    vocabulary: vec![],
                    exercises: vec![],
                },
                tokens_used: 50,
                model: "m".to_string(),
            },
            3_000,
        )
        .unwrap();
        store
            .update_task(&done.id, &TaskPatch::from_task(&done))
            .await
            .unwrap();

        let mut in_flight = tasks[1].clone();
        in_flight.begin_attempt(2_000).unwrap();
        store
            .update_task(&in_flight.id, &TaskPatch::from_task(&in_flight))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resume_generates_only_unfinished_chapters() {
        let f = fixture();
        seed_interrupted_job(&f.store, "job-a").await;

        let recovered = recovery(&f, RecoveryMode::Resume)
            .recover_interrupted_jobs()
            .await
            .unwrap();
        assert_eq!(recovered, 1);

        let job_id = "job-a".to_string();
        assert_eq!(f.service.wait(&job_id).await.unwrap(), JobStatus::Completed);
        assert_eq!(f.generator.call_count(1), 0);
        assert_eq!(f.generator.call_count(2), 1, "interrupted attempt starts over");
        assert_eq!(f.generator.total_calls(), 4);

        let job = f.store.read_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.chapters_completed, 5);
        let tasks = f.store.read_tasks_by_job(&job_id).await.unwrap();
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_fail_mode_records_interruption() {
        let f = fixture();
        seed_interrupted_job(&f.store, "job-a").await;

        let recovered = recovery(&f, RecoveryMode::Fail)
            .recover_interrupted_jobs()
            .await
            .unwrap();
        assert_eq!(recovered, 1);

        let job = f
            .store
            .read_job(&"job-a".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(job.completed_at, Some(5_000));
        assert_eq!(f.generator.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_resumed_job_without_tasks_is_failed() {
        let f = fixture();
        // Restart hit between writing the job and writing its tasks
        let job = GenerationJob::new("job-b", 1_000, "ssw", "ssw-five", "Lost", 50, 5, 2, 1);
        f.store.create_job(&job).await.unwrap();

        let recovered = recovery(&f, RecoveryMode::Resume)
            .recover_interrupted_jobs()
            .await
            .unwrap();
        assert_eq!(recovered, 1);

        assert_eq!(f.service.wait(&job.id).await.unwrap(), JobStatus::Failed);
        let job = f.store.read_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.chapters_completed, 0);
        assert_eq!(job.progress, 0);
        assert!(job.error_message.unwrap().contains("chapter tasks recorded"));
        assert_eq!(f.generator.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_nothing_to_recover() {
        let f = fixture();
        let recovered = recovery(&f, RecoveryMode::Resume)
            .recover_interrupted_jobs()
            .await
            .unwrap();
        assert_eq!(recovered, 0);
    }
}
