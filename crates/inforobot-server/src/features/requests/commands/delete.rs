use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::pipeline::{RequestStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequestCommand {
    pub index_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequestResponse {
    pub index_id: String,
    pub deleted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteRequestError {
    #[error("Request '{0}' not found")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl Request<Result<DeleteRequestResponse, DeleteRequestError>> for DeleteRequestCommand {}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RequestStore,
    command: DeleteRequestCommand,
) -> Result<DeleteRequestResponse, DeleteRequestError> {
    match store.delete(&command.index_id).await {
        Ok(()) => Ok(DeleteRequestResponse {
            index_id: command.index_id,
            deleted: true,
        }),
        Err(StoreError::NotFound(id)) => Err(DeleteRequestError::NotFound(id)),
        Err(e) => Err(DeleteRequestError::Store(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InMemoryRequestStore;

    #[tokio::test]
    async fn test_handle_deletes_request() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();

        let response = handle(
            &store,
            DeleteRequestCommand {
                index_id: req.index_id.clone(),
            },
        )
        .await
        .unwrap();

        assert!(response.deleted);
        assert!(store.get(&req.index_id).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_not_found() {
        let store = InMemoryRequestStore::new();
        let result = handle(
            &store,
            DeleteRequestCommand {
                index_id: "ghost".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(DeleteRequestError::NotFound(_))));
    }
}
