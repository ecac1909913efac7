//! Request API routes
//!
//! # Route Structure
//!
//! - `POST /api/v1/submit` - Submit a URL for enrichment (202)
//! - `POST /api/v1/requests` - Create a request without enqueueing it
//! - `GET /api/v1/requests/:index_id` - Poll a request
//! - `PUT /api/v1/requests/:index_id` - Overwrite content (and optionally status)
//! - `DELETE /api/v1/requests/:index_id` - Delete a request
//! - `GET /api/v1/index` - List all `(index_id, address)` pairs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::{
    commands::{
        CreateRequestCommand, CreateRequestError, DeleteRequestCommand, DeleteRequestError,
        SubmitUrlCommand, SubmitUrlError, UpdateRequestCommand, UpdateRequestError,
    },
    queries::{GetRequestError, GetRequestQuery, ListIndexError, ListIndexQuery},
};
use crate::api::response::{ApiResponse, ErrorResponse};
use crate::features::FeatureState;

// ============================================================================
// Router Configuration
// ============================================================================

pub fn requests_routes() -> Router<FeatureState> {
    Router::new()
        .route("/submit", post(submit_url))
        .route("/requests", post(create_request))
        .route(
            "/requests/:index_id",
            get(get_request).put(update_request).delete(delete_request),
        )
        .route("/index", get(list_index))
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Submit a URL for enrichment
///
/// # Request Body
///
/// ```json
/// { "url": "https://example.com" }
/// ```
///
/// # Response
///
/// - `202 Accepted` - `{ status, index_id, job_id }`
/// - `400 Bad Request` - URL missing or blank
#[tracing::instrument(skip(state, command))]
async fn submit_url(
    State(state): State<FeatureState>,
    Json(command): Json<SubmitUrlCommand>,
) -> Result<Response, RequestsApiError> {
    let response =
        super::commands::submit::handle(state.store.as_ref(), state.queue.as_ref(), command)
            .await?;

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, command))]
async fn create_request(
    State(state): State<FeatureState>,
    Json(command): Json<CreateRequestCommand>,
) -> Result<Response, RequestsApiError> {
    let response = super::commands::create::handle(state.store.as_ref(), command).await?;

    tracing::info!(index_id = %response.index_id, "Request created via API");
    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

/// Overwrite a request's content
///
/// # Request Body
///
/// ```json
/// { "content": "curated text", "status": "complete" }
/// ```
#[tracing::instrument(skip(state, command), fields(index_id = %index_id))]
async fn update_request(
    State(state): State<FeatureState>,
    Path(index_id): Path<String>,
    Json(mut command): Json<UpdateRequestCommand>,
) -> Result<Response, RequestsApiError> {
    command.index_id = index_id;

    let response = super::commands::update::handle(state.store.as_ref(), command).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state), fields(index_id = %index_id))]
async fn delete_request(
    State(state): State<FeatureState>,
    Path(index_id): Path<String>,
) -> Result<Response, RequestsApiError> {
    let command = DeleteRequestCommand { index_id };

    let response = super::commands::delete::handle(state.store.as_ref(), command).await?;

    tracing::info!(index_id = %response.index_id, "Request deleted via API");
    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

#[tracing::instrument(skip(state), fields(index_id = %index_id))]
async fn get_request(
    State(state): State<FeatureState>,
    Path(index_id): Path<String>,
) -> Result<Response, RequestsApiError> {
    let query = GetRequestQuery { index_id };

    let response = super::queries::get::handle(state.store.as_ref(), query).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state))]
async fn list_index(State(state): State<FeatureState>) -> Result<Response, RequestsApiError> {
    let entries =
        super::queries::list_index::handle(state.store.as_ref(), ListIndexQuery::default())
            .await?;

    tracing::debug!(count = entries.len(), "Index listed via API");
    Ok((StatusCode::OK, Json(ApiResponse::success(entries))).into_response())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Unified error type for request API endpoints
#[derive(Debug)]
enum RequestsApiError {
    Submit(SubmitUrlError),
    Create(CreateRequestError),
    Update(UpdateRequestError),
    Delete(DeleteRequestError),
    Get(GetRequestError),
    ListIndex(ListIndexError),
}

impl From<SubmitUrlError> for RequestsApiError {
    fn from(err: SubmitUrlError) -> Self {
        Self::Submit(err)
    }
}

impl From<CreateRequestError> for RequestsApiError {
    fn from(err: CreateRequestError) -> Self {
        Self::Create(err)
    }
}

impl From<UpdateRequestError> for RequestsApiError {
    fn from(err: UpdateRequestError) -> Self {
        Self::Update(err)
    }
}

impl From<DeleteRequestError> for RequestsApiError {
    fn from(err: DeleteRequestError) -> Self {
        Self::Delete(err)
    }
}

impl From<GetRequestError> for RequestsApiError {
    fn from(err: GetRequestError) -> Self {
        Self::Get(err)
    }
}

impl From<ListIndexError> for RequestsApiError {
    fn from(err: ListIndexError) -> Self {
        Self::ListIndex(err)
    }
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

fn internal_error(context: &str, err: &dyn std::fmt::Display) -> Response {
    tracing::error!(error = %err, "Store error during {}", context);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "A storage error occurred",
    )
}

impl IntoResponse for RequestsApiError {
    fn into_response(self) -> Response {
        match self {
            RequestsApiError::Submit(SubmitUrlError::InvalidUrl(e))
            | RequestsApiError::Create(CreateRequestError::InvalidUrl(e)) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            },
            RequestsApiError::Update(UpdateRequestError::InvalidContent(e)) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            },

            RequestsApiError::Update(UpdateRequestError::NotFound(id))
            | RequestsApiError::Delete(DeleteRequestError::NotFound(id))
            | RequestsApiError::Get(GetRequestError::NotFound(id)) => error_response(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Request '{}' not found", id),
            ),

            RequestsApiError::Submit(SubmitUrlError::Store(e)) => internal_error("submit", &e),
            RequestsApiError::Create(CreateRequestError::Store(e)) => internal_error("create", &e),
            RequestsApiError::Update(UpdateRequestError::Store(e)) => internal_error("update", &e),
            RequestsApiError::Delete(DeleteRequestError::Store(e)) => internal_error("delete", &e),
            RequestsApiError::Get(GetRequestError::Store(e)) => internal_error("get", &e),
            RequestsApiError::ListIndex(ListIndexError::Store(e)) => {
                internal_error("index listing", &e)
            },
        }
    }
}
