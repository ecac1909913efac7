//! Get request query
//!
//! Read a single request by its index id. Callers poll this after submission.

use mediator::Request as MediatorRequest;
use serde::{Deserialize, Serialize};

use crate::pipeline::{Request, RequestStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequestQuery {
    pub index_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetRequestError {
    #[error("Request '{0}' not found")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl MediatorRequest<Result<Request, GetRequestError>> for GetRequestQuery {}

pub async fn handle(
    store: &dyn RequestStore,
    query: GetRequestQuery,
) -> Result<Request, GetRequestError> {
    store.get(&query.index_id).await.map_err(|e| match e {
        StoreError::NotFound(id) => GetRequestError::NotFound(id),
        other => GetRequestError::Store(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InMemoryRequestStore;
    use inforobot_common::types::RequestStatus;

    #[tokio::test]
    async fn test_get_right_after_create_is_pending() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();

        let found = handle(
            &store,
            GetRequestQuery {
                index_id: req.index_id.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(found.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = InMemoryRequestStore::new();
        let result = handle(
            &store,
            GetRequestQuery {
                index_id: "missing".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(GetRequestError::NotFound(_))));
    }
}
