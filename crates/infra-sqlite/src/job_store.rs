// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use bookgen_core::domain::{
    ChapterContent, ChapterTask, GenerationJob, GenerationParams, JobId, JobStatus, PartInfo,
    TaskId, TaskStatus,
};
use bookgen_core::error::{AppError, Result};
use bookgen_core::port::{JobPatch, JobStore, TaskPatch};
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn opt_i64(v: Option<u32>) -> Option<i64> {
    v.map(i64::from)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs (
                id, book_type, template_id, title, sector, level,
                target_pages, chapters_total, concurrency, max_retries,
                status, progress, chapters_completed, chapters_failed, chapters_in_progress,
                total_words, total_tokens, total_cost, retry_count,
                error_message, output_files,
                created_at, started_at, completed_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.book_type)
        .bind(&job.template_id)
        .bind(&job.title)
        .bind(&job.sector)
        .bind(&job.level)
        .bind(i64::from(job.target_pages))
        .bind(i64::from(job.chapters_total))
        .bind(job.concurrency as i64)
        .bind(i64::from(job.max_retries))
        .bind(job.status.as_str())
        .bind(i64::from(job.progress))
        .bind(i64::from(job.chapters_completed))
        .bind(i64::from(job.chapters_failed))
        .bind(i64::from(job.chapters_in_progress))
        .bind(job.total_words as i64)
        .bind(job.total_tokens as i64)
        .bind(job.total_cost)
        .bind(i64::from(job.retry_count))
        .bind(&job.error_message)
        .bind(to_json(&job.output_files)?)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_job(&self, id: &JobId, patch: &JobPatch) -> Result<()> {
        let output_files = patch.output_files.as_ref().map(to_json).transpose()?;

        // Partial update: NULL binds keep the stored value.
        // Conditional on a non-terminal status so terminal jobs are never rewritten.
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = COALESCE(?, status),
                progress = COALESCE(?, progress),
                chapters_completed = COALESCE(?, chapters_completed),
                chapters_failed = COALESCE(?, chapters_failed),
                chapters_in_progress = COALESCE(?, chapters_in_progress),
                total_words = COALESCE(?, total_words),
                total_tokens = COALESCE(?, total_tokens),
                total_cost = COALESCE(?, total_cost),
                retry_count = COALESCE(?, retry_count),
                error_message = COALESCE(?, error_message),
                output_files = COALESCE(?, output_files),
                started_at = COALESCE(?, started_at),
                completed_at = COALESCE(?, completed_at),
                updated_at = COALESCE(?, updated_at)
            WHERE id = ?
              AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.progress.map(i64::from))
        .bind(opt_i64(patch.chapters_completed))
        .bind(opt_i64(patch.chapters_failed))
        .bind(opt_i64(patch.chapters_in_progress))
        .bind(patch.total_words.map(|v| v as i64))
        .bind(patch.total_tokens.map(|v| v as i64))
        .bind(patch.total_cost)
        .bind(opt_i64(patch.retry_count))
        .bind(&patch.error_message)
        .bind(output_files)
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(patch.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Job might not exist or already be in a terminal state
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM generation_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        match current {
            None => Err(AppError::NotFound(format!("Job {} not found", id))),
            Some(status) => {
                debug!(job_id = %id, status = %status, "Refused update of terminal job");
                Err(AppError::InvalidState(format!(
                    "Job {} is already {}",
                    id, status
                )))
            }
        }
    }

    async fn read_job(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM generation_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<GenerationJob>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM generation_jobs
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(status)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn create_tasks(&self, tasks: &[ChapterTask]) -> Result<()> {
        // All or nothing: a job never has a partial task set
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for task in tasks {
            let content = task.content.as_ref().map(to_json).transpose()?;
            sqlx::query(
                r#"
                INSERT INTO chapter_tasks (
                    id, job_id, chapter_number, title,
                    part_number, part_title, chapter_in_part,
                    target_word_count, prompt, params,
                    status, retry_count, max_retries,
                    content, word_count, tokens_used,
                    started_at, completed_at, error_message
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&task.id)
            .bind(&task.job_id)
            .bind(i64::from(task.chapter_number))
            .bind(&task.title)
            .bind(i64::from(task.part.part_number))
            .bind(&task.part.part_title)
            .bind(i64::from(task.part.chapter_in_part))
            .bind(i64::from(task.target_word_count))
            .bind(&task.prompt)
            .bind(to_json(&task.params)?)
            .bind(task.status.as_str())
            .bind(i64::from(task.retry_count))
            .bind(i64::from(task.max_retries))
            .bind(content)
            .bind(i64::from(task.word_count))
            .bind(task.tokens_used as i64)
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(&task.error_message)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<()> {
        let content = patch.content.as_ref().map(to_json).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE chapter_tasks
            SET status = COALESCE(?, status),
                retry_count = COALESCE(?, retry_count),
                content = COALESCE(?, content),
                word_count = COALESCE(?, word_count),
                tokens_used = COALESCE(?, tokens_used),
                started_at = COALESCE(?, started_at),
                completed_at = COALESCE(?, completed_at),
                error_message = COALESCE(?, error_message)
            WHERE id = ?
            "#,
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(opt_i64(patch.retry_count))
        .bind(content)
        .bind(opt_i64(patch.word_count))
        .bind(patch.tokens_used.map(|v| v as i64))
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(&patch.error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", id)));
        }
        Ok(())
    }

    async fn read_tasks_by_job(&self, job_id: &JobId) -> Result<Vec<ChapterTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM chapter_tasks WHERE job_id = ? ORDER BY chapter_number ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

fn corrupt(what: &str, id: &str, detail: impl std::fmt::Display) -> AppError {
    AppError::Persistence(format!("Corrupt {} row {}: {}", what, id, detail))
}

/// SQLite row representation of a job
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    book_type: String,
    template_id: String,
    title: String,
    sector: Option<String>,
    level: Option<String>,
    target_pages: i64,
    chapters_total: i64,
    concurrency: i64,
    max_retries: i64,
    status: String,
    progress: i64,
    chapters_completed: i64,
    chapters_failed: i64,
    chapters_in_progress: i64,
    total_words: i64,
    total_tokens: i64,
    total_cost: f64,
    retry_count: i64,
    error_message: Option<String>,
    output_files: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> Result<GenerationJob> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e| corrupt("job", &self.id, e))?;
        let output_files: Vec<String> =
            serde_json::from_str(&self.output_files).map_err(|e| corrupt("job", &self.id, e))?;

        Ok(GenerationJob {
            id: self.id,
            book_type: self.book_type,
            template_id: self.template_id,
            title: self.title,
            sector: self.sector,
            level: self.level,
            target_pages: self.target_pages as u32,
            chapters_total: self.chapters_total as u32,
            concurrency: self.concurrency as usize,
            max_retries: self.max_retries as u32,
            status,
            progress: self.progress.clamp(0, 100) as u8,
            chapters_completed: self.chapters_completed as u32,
            chapters_failed: self.chapters_failed as u32,
            chapters_in_progress: self.chapters_in_progress as u32,
            total_words: self.total_words as u64,
            total_tokens: self.total_tokens as u64,
            total_cost: self.total_cost,
            retry_count: self.retry_count as u32,
            error_message: self.error_message,
            output_files,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}

/// SQLite row representation of a chapter task
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    job_id: String,
    chapter_number: i64,
    title: String,
    part_number: i64,
    part_title: String,
    chapter_in_part: i64,
    target_word_count: i64,
    prompt: String,
    params: String,
    status: String,
    retry_count: i64,
    max_retries: i64,
    content: Option<String>,
    word_count: i64,
    tokens_used: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    error_message: Option<String>,
}

impl TaskRow {
    fn into_task(self) -> Result<ChapterTask> {
        let status: TaskStatus = self
            .status
            .parse()
            .map_err(|e| corrupt("task", &self.id, e))?;
        let params: GenerationParams =
            serde_json::from_str(&self.params).map_err(|e| corrupt("task", &self.id, e))?;
        let content: Option<ChapterContent> = self
            .content
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt("task", &self.id, e))?;

        Ok(ChapterTask {
            id: self.id,
            job_id: self.job_id,
            chapter_number: self.chapter_number as u32,
            title: self.title,
            part: PartInfo {
                part_number: self.part_number as u32,
                part_title: self.part_title,
                chapter_in_part: self.chapter_in_part as u32,
            },
            target_word_count: self.target_word_count as u32,
            prompt: self.prompt,
            params,
            status,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            content,
            word_count: self.word_count as u32,
            tokens_used: self.tokens_used as u64,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use bookgen_core::application::decompose;
    use bookgen_core::domain::{ContentSection, GeneratedChapter};
    use bookgen_core::port::{InMemoryTemplateCatalog, TemplateCatalog};

    async fn setup_test_store() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(pool)
    }

    fn job(id: &str, created_at: i64) -> GenerationJob {
        let mut job = GenerationJob::new(id, created_at, "jlpt", "jlpt-n5", "N5 Book", 80, 10, 3, 2);
        job.level = Some("N5".to_string());
        job
    }

    fn tasks_for(job: &GenerationJob) -> Vec<ChapterTask> {
        let template = InMemoryTemplateCatalog::builtin().get("jlpt-n5").unwrap();
        decompose(&template, job)
    }

    #[tokio::test]
    async fn test_create_and_read_job() {
        let store = setup_test_store().await;
        let job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();

        let found = store.read_job(&job.id).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(store.read_job(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_job_is_persistence_error() {
        let store = setup_test_store().await;
        let job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();
        let err = store.create_job(&job).await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(err.to_string().contains("Unique constraint"));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_unset_fields() {
        let store = setup_test_store().await;
        let mut job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();

        job.start(2000).unwrap();
        store
            .update_job(&job.id, &JobPatch::transition(&job))
            .await
            .unwrap();

        let patch = JobPatch {
            chapters_in_progress: Some(3),
            ..Default::default()
        };
        store.update_job(&job.id, &patch).await.unwrap();

        let found = store.read_job(&job.id).await.unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Generating);
        assert_eq!(found.started_at, Some(2000));
        assert_eq!(found.chapters_in_progress, 3);
        assert_eq!(found.title, "N5 Book");
    }

    #[tokio::test]
    async fn test_terminal_job_refuses_updates() {
        let store = setup_test_store().await;
        let mut job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();

        job.cancel(2000, "Cancelled by request").unwrap();
        store
            .update_job(&job.id, &JobPatch::transition(&job))
            .await
            .unwrap();

        let late = JobPatch {
            chapters_completed: Some(4),
            ..Default::default()
        };
        assert!(matches!(
            store.update_job(&job.id, &late).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            store.update_job(&"missing".to_string(), &late).await,
            Err(AppError::NotFound(_))
        ));

        let found = store.read_job(&job.id).await.unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Cancelled);
        assert_eq!(found.chapters_completed, 0);
    }

    #[tokio::test]
    async fn test_finalized_patch_round_trips() {
        let store = setup_test_store().await;
        let mut job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();

        job.start(2000).unwrap();
        job.record_batch(9, 1, 4, 3000).unwrap();
        job.total_words = 12_345;
        job.total_tokens = 67_890;
        job.total_cost = 1.25;
        job.output_files = vec!["/out/job-1/book.json".to_string()];
        job.complete(4000, Some("1 of 10 chapters failed: chapter 7".to_string()))
            .unwrap();
        store
            .update_job(&job.id, &JobPatch::finalized(&job))
            .await
            .unwrap();

        assert_eq!(store.read_job(&job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn test_tasks_round_trip_in_chapter_order() {
        let store = setup_test_store().await;
        let job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();

        let mut tasks = tasks_for(&job);
        tasks.reverse();
        store.create_tasks(&tasks).await.unwrap();

        let read = store.read_tasks_by_job(&job.id).await.unwrap();
        assert_eq!(read.len(), 10);
        let numbers: Vec<u32> = read.iter().map(|t| t.chapter_number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
        assert_eq!(read[0], tasks[9]);
    }

    #[tokio::test]
    async fn test_task_creation_is_atomic() {
        let store = setup_test_store().await;
        let job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();

        let mut tasks = tasks_for(&job);
        // Duplicate chapter number violates the unique constraint
        let mut dup = tasks[0].clone();
        dup.id = "job-1-dup".to_string();
        tasks.push(dup);

        assert!(store.create_tasks(&tasks).await.is_err());
        assert!(store.read_tasks_by_job(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_update_stores_content() {
        let store = setup_test_store().await;
        let job = job("job-1", 1000);
        store.create_job(&job).await.unwrap();
        let mut task = tasks_for(&job).remove(0);
        store.create_tasks(std::slice::from_ref(&task)).await.unwrap();

        task.begin_attempt(2000).unwrap();
        task.complete(
            GeneratedChapter {
                content: ChapterContent {
                    title: task.title.clone(),
                    summary: "挨拶".to_string(),
                    sections: vec![ContentSection {
                        heading: "Greetings".to_string(),
                        body: "おはようございます".to_string(),
                    }],
                    vocabulary: vec![],
                    exercises: vec![],
                },
                tokens_used: 321,
                model: "m".to_string(),
            },
            3000,
        )
        .unwrap();
        store
            .update_task(&task.id, &TaskPatch::from_task(&task))
            .await
            .unwrap();

        let read = store.read_tasks_by_job(&job.id).await.unwrap().remove(0);
        assert_eq!(read, task);
        assert!(matches!(
            store
                .update_task(&"missing".to_string(), &TaskPatch::default())
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first_with_filter() {
        let store = setup_test_store().await;
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            store.create_job(&job(id, 1000 + i as i64)).await.unwrap();
        }
        let mut done = job("d", 500);
        store.create_job(&done).await.unwrap();
        done.cancel(600, "stop").unwrap();
        store
            .update_job(&done.id, &JobPatch::transition(&done))
            .await
            .unwrap();

        let all = store.list_jobs(None, 10).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a", "d"]);

        let pending = store.list_jobs(Some(JobStatus::Pending), 2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "c");

        let cancelled = store.list_jobs(Some(JobStatus::Cancelled), 10).await.unwrap();
        assert_eq!(cancelled.len(), 1);
    }
}
