// Generation Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Job status. Moves forward only: pending -> generating -> terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are final; nothing mutates a job after reaching one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "generating" => Ok(JobStatus::Generating),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::ValidationError(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

/// One request to produce a full book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub book_type: String,
    pub template_id: String,
    pub title: String,
    pub sector: Option<String>,
    pub level: Option<String>,

    pub target_pages: u32,
    pub chapters_total: u32,
    pub concurrency: usize,
    pub max_retries: u32,

    pub status: JobStatus,
    pub progress: u8,
    pub chapters_completed: u32,
    pub chapters_failed: u32,
    pub chapters_in_progress: u32,

    // Accumulators
    pub total_words: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub retry_count: u32,

    pub error_message: Option<String>,
    pub output_files: Vec<String>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl GenerationJob {
    /// Create a pending job.
    ///
    /// `id` and `created_at` are injected (IdProvider / TimeProvider), never generated here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        book_type: impl Into<String>,
        template_id: impl Into<String>,
        title: impl Into<String>,
        target_pages: u32,
        chapters_total: u32,
        concurrency: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            id: id.into(),
            book_type: book_type.into(),
            template_id: template_id.into(),
            title: title.into(),
            sector: None,
            level: None,
            target_pages,
            chapters_total,
            concurrency,
            max_retries,
            status: JobStatus::Pending,
            progress: 0,
            chapters_completed: 0,
            chapters_failed: 0,
            chapters_in_progress: 0,
            total_words: 0,
            total_tokens: 0,
            total_cost: 0.0,
            retry_count: 0,
            error_message: None,
            output_files: Vec::new(),
            created_at,
            started_at: None,
            completed_at: None,
            updated_at: created_at,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        let allowed = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Generating) => true,
            (JobStatus::Generating, JobStatus::Completed) => true,
            (from, JobStatus::Failed | JobStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                entity: "job",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Enter `generating`. Happens exactly once, when the first batch begins.
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Generating)?;
        self.started_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Record cumulative counters after a batch.
    ///
    /// Progress never regresses while generating.
    pub fn record_batch(
        &mut self,
        completed: u32,
        failed: u32,
        retries: u32,
        now_millis: i64,
    ) -> Result<()> {
        if completed + failed > self.chapters_total {
            return Err(DomainError::ValidationError(format!(
                "chapter counters exceed total: {} + {} > {}",
                completed, failed, self.chapters_total
            )));
        }
        self.chapters_completed = completed;
        self.chapters_failed = failed;
        self.chapters_in_progress = 0;
        self.retry_count = retries;
        self.progress = self.progress.max(progress_percent(completed, self.chapters_total));
        self.updated_at = now_millis;
        Ok(())
    }

    /// Finalize as completed. A non-empty summary marks a partial success.
    pub fn complete(&mut self, now_millis: i64, summary: Option<String>) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.chapters_in_progress = 0;
        self.error_message = summary;
        self.completed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    pub fn fail(&mut self, now_millis: i64, message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.chapters_in_progress = 0;
        self.completed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    pub fn cancel(&mut self, now_millis: i64, message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Cancelled)?;
        self.error_message = Some(message.into());
        self.chapters_in_progress = 0;
        self.completed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }
}

/// `floor(completed / total * 100)`; an empty book counts as done.
pub fn progress_percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as u64 * 100) / total as u64).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> GenerationJob {
        GenerationJob::new("job-1", 1000, "ssw", "ssw-care", "Care", 50, 5, 2, 3)
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut job = job();
        job.start(2000).unwrap();
        assert_eq!(job.status, JobStatus::Generating);
        assert!(job.start(3000).is_err(), "generating is entered once");

        job.complete(4000, None).unwrap();
        assert!(job.fail(5000, "late").is_err());
        assert!(job.cancel(5000, "late").is_err());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_pending_job_cannot_complete() {
        let mut job = job();
        assert!(job.complete(2000, None).is_err());
        assert!(job.cancel(2000, "stop").is_ok());
    }

    #[test]
    fn test_progress_floor_and_monotonic() {
        let mut job = GenerationJob::new("j", 0, "jlpt", "jlpt-n5", "N5", 30, 3, 1, 0);
        job.start(1).unwrap();
        job.record_batch(1, 0, 0, 2).unwrap();
        assert_eq!(job.progress, 33);
        job.record_batch(2, 1, 0, 3).unwrap();
        assert_eq!(job.progress, 66);
    }

    #[test]
    fn test_counters_never_exceed_total() {
        let mut job = job();
        job.start(1).unwrap();
        assert!(job.record_batch(4, 2, 0, 2).is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Generating,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }
}
