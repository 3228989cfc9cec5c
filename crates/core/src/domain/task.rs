// Chapter Generation Task Domain Model

use crate::domain::content::{ChapterContent, GeneratedChapter};
use crate::domain::error::{DomainError, Result};
use crate::domain::job::JobId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Task ID, derived from the job id and chapter number.
pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Generating,
    Retrying,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Generating => "generating",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "generating" => Ok(TaskStatus::Generating),
            "retrying" => Ok(TaskStatus::Retrying),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// Where a chapter sits inside the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub part_number: u32,
    pub part_title: String,
    pub chapter_in_part: u32,
}

/// Parameters forwarded to the content generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
        }
    }
}

/// One unit of work: exactly one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterTask {
    pub id: TaskId,
    pub job_id: JobId,
    pub chapter_number: u32,
    pub title: String,
    pub part: PartInfo,
    pub target_word_count: u32,
    pub prompt: String,
    pub params: GenerationParams,

    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,

    pub content: Option<ChapterContent>,
    pub word_count: u32,
    pub tokens_used: u64,

    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

impl ChapterTask {
    fn illegal(&self, to: TaskStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            entity: "task",
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// pending/retrying -> generating
    pub fn begin_attempt(&mut self, now_millis: i64) -> Result<()> {
        match self.status {
            TaskStatus::Pending => {
                self.started_at = Some(now_millis);
            }
            TaskStatus::Retrying => {}
            _ => return Err(self.illegal(TaskStatus::Generating)),
        }
        self.status = TaskStatus::Generating;
        Ok(())
    }

    /// generating -> retrying, consuming one retry.
    pub fn schedule_retry(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status != TaskStatus::Generating {
            return Err(self.illegal(TaskStatus::Retrying));
        }
        if self.retry_count >= self.max_retries {
            return Err(DomainError::RetryLimitExceeded {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.retry_count += 1;
        self.status = TaskStatus::Retrying;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// generating -> completed
    pub fn complete(&mut self, generated: GeneratedChapter, now_millis: i64) -> Result<()> {
        if self.status != TaskStatus::Generating {
            return Err(self.illegal(TaskStatus::Completed));
        }
        self.word_count = generated.content.word_count();
        self.tokens_used = generated.tokens_used;
        self.content = Some(generated.content);
        self.status = TaskStatus::Completed;
        self.error_message = None;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// generating -> failed (terminal)
    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() || self.status == TaskStatus::Pending {
            return Err(self.illegal(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }

    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
