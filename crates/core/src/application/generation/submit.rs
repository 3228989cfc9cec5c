// Submit Use Case

use crate::application::constants::{MAX_CONCURRENCY, MAX_RETRIES_LIMIT};
use crate::application::decomposer::decompose;
use crate::domain::{BookTemplate, GenerationJob};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobPatch, JobStore, TemplateCatalog, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Request to generate one book. Unset fields fall back to template or
/// service defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub book_type: String,

    #[serde(default)]
    pub template_id: Option<String>,

    /// Defaults to the template name
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub sector: Option<String>,

    #[serde(default)]
    pub level: Option<String>,

    /// Scales every part's page budget; defaults to the template's total
    #[serde(default)]
    pub target_pages: Option<u32>,

    /// Fewer chapters than the template truncates it
    #[serde(default)]
    pub target_chapters: Option<u32>,

    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Fallbacks for requests that leave concurrency or retries unset.
#[derive(Debug, Clone, Copy)]
pub struct SubmitDefaults {
    pub concurrency: usize,
    pub max_retries: u32,
}

/// Reject malformed requests before anything is looked up or written.
pub fn validate_request(req: &GenerationRequest) -> Result<()> {
    if req.book_type.trim().is_empty() {
        return Err(AppError::Validation("book_type cannot be empty".to_string()));
    }
    if let Some(c) = req.concurrency {
        if c == 0 || c > MAX_CONCURRENCY {
            return Err(AppError::Validation(format!(
                "concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY, c
            )));
        }
    }
    if let Some(r) = req.max_retries {
        if r > MAX_RETRIES_LIMIT {
            return Err(AppError::Validation(format!(
                "max_retries must be at most {} (got {})",
                MAX_RETRIES_LIMIT, r
            )));
        }
    }
    if req.target_pages == Some(0) {
        return Err(AppError::Validation("target_pages must be positive".to_string()));
    }
    if req.target_chapters == Some(0) {
        return Err(AppError::Validation("target_chapters must be positive".to_string()));
    }
    Ok(())
}

/// Chapters to generate: the template total, or fewer when requested.
pub fn chapter_count(template: &BookTemplate, target_chapters: Option<u32>) -> Result<u32> {
    let available = template.total_chapters();
    match target_chapters {
        None => Ok(available),
        Some(n) if n <= available => Ok(n),
        Some(n) => Err(AppError::Validation(format!(
            "template '{}' has {} chapters, {} requested",
            template.id, available, n
        ))),
    }
}

/// Execute submit use case: validate, resolve, persist job and tasks.
///
/// Returns the pending job. Nothing is written when validation or template
/// resolution fails. When task persistence fails the already written job is
/// marked failed best-effort and the error is returned.
///
/// # Arguments
///
/// * `store` - Job store
/// * `catalog` - Template catalog
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `defaults` - Concurrency and retry fallbacks
/// * `req` - Generation request
pub async fn execute(
    store: &dyn JobStore,
    catalog: &dyn TemplateCatalog,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    defaults: SubmitDefaults,
    req: GenerationRequest,
) -> Result<GenerationJob> {
    validate_request(&req)?;

    let template = catalog.resolve(&req.book_type, req.template_id.as_deref())?;
    let chapters_total = chapter_count(&template, req.target_chapters)?;

    let mut job = GenerationJob::new(
        id_provider.generate_id(),
        time_provider.now_millis(),
        template.book_type.clone(),
        template.id.clone(),
        req.title.clone().unwrap_or_else(|| template.name.clone()),
        req.target_pages.unwrap_or_else(|| template.total_pages()),
        chapters_total,
        req.concurrency.unwrap_or(defaults.concurrency),
        req.max_retries.unwrap_or(defaults.max_retries),
    );
    job.sector = req.sector;
    job.level = req.level;

    store.create_job(&job).await?;

    let tasks = decompose(&template, &job);
    if let Err(e) = store.create_tasks(&tasks).await {
        error!(job_id = %job.id, error = %e, "Failed to persist chapter tasks");
        if job
            .fail(time_provider.now_millis(), format!("Task persistence failed: {}", e))
            .is_ok()
        {
            if let Err(mark_err) = store.update_job(&job.id, &JobPatch::transition(&job)).await {
                error!(job_id = %job.id, error = %mark_err, "Failed to mark job failed");
            }
        }
        return Err(e);
    }

    info!(
        job_id = %job.id,
        book_type = %job.book_type,
        template_id = %job.template_id,
        chapters = job.chapters_total,
        concurrency = job.concurrency,
        max_retries = job.max_retries,
        "Book generation submitted"
    );

    Ok(job)
}
