//! Get job query
//!
//! Looks up a single queue job by id.

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::pipeline::{JobId, JobInfo, JobQueue, QueueError};

/// Query to get a job by ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: JobId,
}

#[derive(Debug, thiserror::Error)]
pub enum GetJobError {
    #[error("Job {0} not found")]
    NotFound(JobId),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl Request<Result<JobInfo, GetJobError>> for GetJobQuery {}

pub async fn handle(queue: &dyn JobQueue, query: GetJobQuery) -> Result<JobInfo, GetJobError> {
    queue
        .job_info(query.job_id)
        .await?
        .ok_or(GetJobError::NotFound(query.job_id))
}
