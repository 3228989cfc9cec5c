// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Unknown book type or template id. Rejected before anything is scheduled.
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Job/task store unavailable or rejected a write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A task failed on every attempt. Recorded per task, never aborts the job.
    #[error("Chapter {chapter} failed after {attempts} attempts: {last_error}")]
    GenerationExhausted {
        chapter: u32,
        attempts: u32,
        last_error: crate::port::GenerationError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Persistence(String)
