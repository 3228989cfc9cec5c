//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{invalid_params, to_rpc_error};
use crate::types::{
    CancelResponse, ChapterView, ChaptersRequest, ChaptersResponse, JobRequest, JobSummary,
    ListRequest, ListResponse, SubmitRequest, SubmitResponse, TemplateListResponse,
    TemplateSummary,
};
use bookgen_core::application::GenerationService;
use bookgen_core::domain::{AssembledBook, GenerationJob, JobStatus, ProgressSnapshot};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::{PendingSubscriptionSink, SubscriptionMessage};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound for book.list.v1
const MAX_LIST_LIMIT: usize = 200;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<GenerationService>,
    cost_per_1k_tokens: f64,
}

impl RpcHandler {
    pub fn new(service: Arc<GenerationService>, cost_per_1k_tokens: f64) -> Self {
        Self {
            service,
            cost_per_1k_tokens,
        }
    }

    /// book.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        let job_id = self
            .service
            .submit(params.into())
            .await
            .map_err(to_rpc_error)?;

        let job = self.service.get_status(&job_id).await.map_err(to_rpc_error)?;
        info!(job_id = %job_id, chapters = job.chapters_total, "Book submitted over RPC");

        Ok(SubmitResponse {
            job_id,
            status: job.status.to_string(),
            chapters_total: job.chapters_total,
        })
    }

    /// book.status.v1
    pub async fn status(&self, params: JobRequest) -> Result<GenerationJob, ErrorObjectOwned> {
        self.service
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// book.cancel.v1
    pub async fn cancel(&self, params: JobRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        let cancelled = self
            .service
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: params.job_id,
            cancelled,
        })
    }

    /// book.chapters.v1
    pub async fn chapters(
        &self,
        params: ChaptersRequest,
    ) -> Result<ChaptersResponse, ErrorObjectOwned> {
        let tasks = self
            .service
            .get_chapters(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(ChaptersResponse {
            job_id: params.job_id,
            chapters: tasks
                .into_iter()
                .map(|task| ChapterView::from_task(task, params.include_content))
                .collect(),
        })
    }

    /// book.get.v1
    pub async fn book(&self, params: JobRequest) -> Result<AssembledBook, ErrorObjectOwned> {
        self.service
            .get_book(&params.job_id, self.cost_per_1k_tokens)
            .await
            .map_err(to_rpc_error)
    }

    /// book.list.v1
    pub async fn list(&self, params: ListRequest) -> Result<ListResponse, ErrorObjectOwned> {
        let status = params
            .status
            .as_deref()
            .map(JobStatus::from_str)
            .transpose()
            .map_err(|e| invalid_params(e.to_string()))?;
        let limit = params.limit.clamp(1, MAX_LIST_LIMIT);

        let jobs = self
            .service
            .list_jobs(status, limit)
            .await
            .map_err(to_rpc_error)?;

        Ok(ListResponse {
            jobs: jobs.into_iter().map(JobSummary::from).collect(),
        })
    }

    /// template.list.v1
    pub fn templates(&self) -> TemplateListResponse {
        let mut templates: Vec<TemplateSummary> = self
            .service
            .catalog()
            .list()
            .into_iter()
            .map(TemplateSummary::from)
            .collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        TemplateListResponse { templates }
    }

    /// progress.read.v1
    pub async fn read_progress(
        &self,
        params: JobRequest,
    ) -> Result<ProgressSnapshot, ErrorObjectOwned> {
        self.service
            .read_progress(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// progress.subscribe.v1
    ///
    /// Sends the current snapshot, then every update until the job reaches a
    /// terminal state or the client unsubscribes.
    pub async fn subscribe_progress(
        &self,
        params: JobRequest,
        pending: PendingSubscriptionSink,
    ) -> SubscriptionResult {
        // Subscribe before reading so no update between the two is lost
        let mut subscription = self.service.subscribe(&params.job_id);
        let current = match self.service.read_progress(&params.job_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                pending.reject(to_rpc_error(e)).await;
                return Ok(());
            }
        };

        let sink = pending.accept().await?;
        debug!(job_id = %params.job_id, "Progress subscription opened");

        sink.send(SubscriptionMessage::from_json(&current)?).await?;
        if current.status.is_terminal() {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = sink.closed() => {
                    subscription.close();
                    break;
                }
                next = subscription.recv() => match next {
                    Some(snapshot) => {
                        let terminal = snapshot.status.is_terminal();
                        sink.send(SubscriptionMessage::from_json(&snapshot)?).await?;
                        if terminal {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        debug!(job_id = %params.job_id, "Progress subscription closed");
        Ok(())
    }
}
