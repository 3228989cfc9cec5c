// Progress snapshot and assembled book views

use crate::domain::content::ChapterContent;
use crate::domain::job::{GenerationJob, JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// Latest known progress state of a job. Superseded on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: String,
    pub chapters_completed: u32,
    pub chapters_total: u32,
    pub chapters_failed: u32,
    pub estimated_completion: Option<i64>, // epoch ms
    pub updated_at: i64,
}

impl ProgressSnapshot {
    pub fn from_job(job: &GenerationJob, stage: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            stage: stage.into(),
            chapters_completed: job.chapters_completed,
            chapters_total: job.chapters_total,
            chapters_failed: job.chapters_failed,
            estimated_completion: None,
            updated_at: job.updated_at,
        }
    }

    pub fn with_estimate(mut self, estimated_completion: i64) -> Self {
        self.estimated_completion = Some(estimated_completion);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledChapter {
    pub chapter_number: u32,
    pub title: String,
    pub part_title: String,
    pub word_count: u32,
    pub content: ChapterContent,
}

/// Finalized book: completed chapters in ascending chapter order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledBook {
    pub job_id: JobId,
    pub title: String,
    pub chapters: Vec<AssembledChapter>,
    pub failed_chapters: Vec<u32>,
    pub total_words: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}
