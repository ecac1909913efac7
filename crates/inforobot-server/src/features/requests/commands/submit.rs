//! Submit a URL for enrichment
//!
//! Persists a PENDING request and enqueues one processing job for it. The
//! caller gets the index id back immediately and polls for the result.

use mediator::Request;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::features::shared::validation::{validate_url, UrlValidationError};
use crate::pipeline::{JobId, JobQueue, ProcessUrlJob, RequestStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitUrlCommand {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitUrlResponse {
    /// `queued` when a job was enqueued, `pending` when only the row exists
    pub status: String,
    pub index_id: String,
    pub job_id: Option<JobId>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitUrlError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Request<Result<SubmitUrlResponse, SubmitUrlError>> for SubmitUrlCommand {}

impl SubmitUrlCommand {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }

    pub fn validate(&self) -> Result<&str, SubmitUrlError> {
        Ok(validate_url(self.url.as_deref())?)
    }
}

#[tracing::instrument(skip(store, queue, command))]
pub async fn handle(
    store: &dyn RequestStore,
    queue: &dyn JobQueue,
    command: SubmitUrlCommand,
) -> Result<SubmitUrlResponse, SubmitUrlError> {
    let url = command.validate()?;
    let request = store.create(url).await?;

    // The row is already durable; if the queue is down the sweep picks it up
    let job_id = match queue.enqueue(ProcessUrlJob::from(&request).into()).await {
        Ok(job_id) => Some(job_id),
        Err(e) => {
            warn!(
                index_id = %request.index_id,
                error = %e,
                "Enqueue failed, request left for reconciliation"
            );
            None
        },
    };

    info!(index_id = %request.index_id, url = %request.url, ?job_id, "URL submitted");

    Ok(SubmitUrlResponse {
        status: if job_id.is_some() { "queued" } else { "pending" }.to_string(),
        index_id: request.index_id,
        job_id,
    })
}
