//! Manually overwrite a request's content, optionally with a new status

use inforobot_common::types::RequestStatus;
use mediator::Request as MediatorRequest;
use serde::{Deserialize, Serialize};

use crate::features::shared::validation::{validate_content, ContentValidationError};
use crate::pipeline::{Request, RequestStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequestCommand {
    #[serde(skip)]
    pub index_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateRequestError {
    #[error(transparent)]
    InvalidContent(#[from] ContentValidationError),
    #[error("Request '{0}' not found")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for UpdateRequestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl MediatorRequest<Result<Request, UpdateRequestError>> for UpdateRequestCommand {}

#[tracing::instrument(skip(store, command), fields(index_id = %command.index_id))]
pub async fn handle(
    store: &dyn RequestStore,
    command: UpdateRequestCommand,
) -> Result<Request, UpdateRequestError> {
    let content = validate_content(command.content.as_deref())?;
    let request = store
        .update_content(&command.index_id, content, command.status)
        .await?;

    tracing::info!(status = %request.status, "Request updated");
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InMemoryRequestStore;

    fn cmd(index_id: &str, content: Option<&str>, status: Option<RequestStatus>) -> UpdateRequestCommand {
        UpdateRequestCommand {
            index_id: index_id.to_string(),
            content: content.map(str::to_string),
            status,
        }
    }

    #[tokio::test]
    async fn test_update_content_and_status() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();

        let updated = handle(
            &store,
            cmd(&req.index_id, Some("curated"), Some(RequestStatus::Complete)),
        )
        .await
        .unwrap();

        assert_eq!(updated.status, RequestStatus::Complete);
        assert_eq!(updated.content.as_deref(), Some("curated"));
    }

    #[tokio::test]
    async fn test_update_requires_content() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();

        let result = handle(&store, cmd(&req.index_id, None, Some(RequestStatus::Complete))).await;
        assert!(matches!(result, Err(UpdateRequestError::InvalidContent(_))));
    }

    #[tokio::test]
    async fn test_update_unknown_request() {
        let store = InMemoryRequestStore::new();
        let result = handle(&store, cmd("ghost", Some("x"), None)).await;
        assert!(matches!(result, Err(UpdateRequestError::NotFound(id)) if id == "ghost"));
    }
}
