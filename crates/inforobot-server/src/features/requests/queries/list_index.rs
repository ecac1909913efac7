//! List index query
//!
//! Every stored request as `(index_id, address)`, oldest first.

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::pipeline::{IndexEntry, RequestStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListIndexQuery {}

#[derive(Debug, thiserror::Error)]
pub enum ListIndexError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Request<Result<Vec<IndexEntry>, ListIndexError>> for ListIndexQuery {}

pub async fn handle(
    store: &dyn RequestStore,
    _query: ListIndexQuery,
) -> Result<Vec<IndexEntry>, ListIndexError> {
    Ok(store.list_index().await?)
}
