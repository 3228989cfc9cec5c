// Domain Layer - Pure business logic and entities

pub mod content;
pub mod error;
pub mod job;
pub mod progress;
pub mod task;
pub mod template;

// Re-exports
pub use content::{
    count_words, ChapterContent, ContentSection, Exercise, GeneratedChapter, VocabularyEntry,
};
pub use error::DomainError;
pub use job::{progress_percent, GenerationJob, JobId, JobStatus};
pub use progress::{AssembledBook, AssembledChapter, ProgressSnapshot};
pub use task::{ChapterTask, GenerationParams, PartInfo, TaskId, TaskStatus};
pub use template::{BookTemplate, ContentRequirements, PartTemplate};
