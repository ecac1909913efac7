//! Job routes
//!
//! Public read-only routes for polling the queue state of a job.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::queries::{get_job::handle as handle_get_job, GetJobError, GetJobQuery};
use crate::api::response::{ApiResponse, ErrorResponse};
use crate::pipeline::{JobId, JobQueue};

/// Create job routes
pub fn jobs_routes() -> Router<Arc<dyn JobQueue>> {
    Router::new().route("/:job_id", get(get_job))
}

/// Get a specific job by ID
///
/// GET /jobs/:job_id
#[tracing::instrument(skip(queue))]
async fn get_job(
    State(queue): State<Arc<dyn JobQueue>>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_id) = job_id.parse::<JobId>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "VALIDATION_ERROR",
                format!("Invalid job id '{}'", job_id),
            )),
        )
            .into_response();
    };

    match handle_get_job(queue.as_ref(), GetJobQuery { job_id }).await {
        Ok(job) => (StatusCode::OK, Json(ApiResponse::success(job))).into_response(),
        Err(GetJobError::NotFound(id)) => {
            tracing::debug!(job_id = id, "Job not found");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("NOT_FOUND", format!("Job {} not found", id))),
            )
                .into_response()
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to load job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("INTERNAL_ERROR", "A queue error occurred")),
            )
                .into_response()
        },
    }
}
