//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use bookgen_core::application::GenerationRequest;
use bookgen_core::domain::{BookTemplate, ChapterContent, ChapterTask, GenerationJob};
use serde::{Deserialize, Serialize};

/// book.submit.v1 - Submit a book for generation
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub book_type: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub target_pages: Option<u32>,
    #[serde(default)]
    pub target_chapters: Option<u32>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl From<SubmitRequest> for GenerationRequest {
    fn from(req: SubmitRequest) -> Self {
        GenerationRequest {
            book_type: req.book_type,
            template_id: req.template_id,
            title: req.title,
            sector: req.sector,
            level: req.level,
            target_pages: req.target_pages,
            target_chapters: req.target_chapters,
            concurrency: req.concurrency,
            max_retries: req.max_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
    pub chapters_total: u32,
}

/// Params for methods addressing one job
/// (book.status.v1, book.cancel.v1, book.get.v1, progress.read.v1, progress.subscribe.v1)
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
}

/// book.cancel.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// book.chapters.v1 - Per-chapter task records
#[derive(Debug, Deserialize)]
pub struct ChaptersRequest {
    pub job_id: String,
    #[serde(default)]
    pub include_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterView {
    pub chapter_number: u32,
    pub title: String,
    pub part_title: String,
    pub status: String,
    pub retry_count: u32,
    pub target_word_count: u32,
    pub word_count: u32,
    pub tokens_used: u64,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ChapterContent>,
}

impl ChapterView {
    pub fn from_task(task: ChapterTask, include_content: bool) -> Self {
        Self {
            chapter_number: task.chapter_number,
            title: task.title,
            part_title: task.part.part_title,
            status: task.status.to_string(),
            retry_count: task.retry_count,
            target_word_count: task.target_word_count,
            word_count: task.word_count,
            tokens_used: task.tokens_used,
            error_message: task.error_message,
            content: if include_content { task.content } else { None },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaptersResponse {
    pub job_id: String,
    pub chapters: Vec<ChapterView>,
}

/// book.list.v1 - Recent jobs, newest first
#[derive(Debug, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub title: String,
    pub book_type: String,
    pub status: String,
    pub progress: u8,
    pub chapters_completed: u32,
    pub chapters_failed: u32,
    pub chapters_total: u32,
    pub created_at: i64,
}

impl From<GenerationJob> for JobSummary {
    fn from(job: GenerationJob) -> Self {
        Self {
            job_id: job.id,
            title: job.title,
            book_type: job.book_type,
            status: job.status.to_string(),
            progress: job.progress,
            chapters_completed: job.chapters_completed,
            chapters_failed: job.chapters_failed,
            chapters_total: job.chapters_total,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub jobs: Vec<JobSummary>,
}

/// template.list.v1 - Available templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub book_type: String,
    pub name: String,
    pub description: String,
    pub chapters: u32,
    pub pages: u32,
}

impl From<BookTemplate> for TemplateSummary {
    fn from(template: BookTemplate) -> Self {
        Self {
            chapters: template.total_chapters(),
            pages: template.total_pages(),
            id: template.id,
            book_type: template.book_type,
            name: template.name,
            description: template.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateSummary>,
}
