//! Create a request without enqueueing it
//!
//! The next reconciliation sweep picks the row up.

use inforobot_common::types::RequestStatus;
use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::features::shared::validation::{validate_url, UrlValidationError};
use crate::pipeline::{RequestStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestCommand {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequestResponse {
    pub index_id: String,
    pub url: String,
    pub status: RequestStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateRequestError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Request<Result<CreateRequestResponse, CreateRequestError>> for CreateRequestCommand {}

#[tracing::instrument(skip(store, command))]
pub async fn handle(
    store: &dyn RequestStore,
    command: CreateRequestCommand,
) -> Result<CreateRequestResponse, CreateRequestError> {
    let url = validate_url(command.url.as_deref())?;
    let request = store.create(url).await?;

    Ok(CreateRequestResponse {
        index_id: request.index_id,
        url: request.url,
        status: request.status,
    })
}
