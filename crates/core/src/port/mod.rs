// Port Layer - Interfaces for external collaborators

pub mod book_exporter;
pub mod content_generator;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod template_catalog;
pub mod time_provider;

// Re-exports
pub use book_exporter::BookExporter;
pub use content_generator::{ContentGenerator, GenerationError};
pub use id_provider::{IdProvider, UuidProvider};
pub use job_store::{JobPatch, JobStore, TaskPatch};
pub use template_catalog::{InMemoryTemplateCatalog, TemplateCatalog};
pub use time_provider::{SystemTimeProvider, TimeProvider};
