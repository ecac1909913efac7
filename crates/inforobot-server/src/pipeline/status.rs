//! Status updater
//!
//! Every terminal outcome of a job goes through [`StatusUpdater::set`], which
//! writes status and content in one statement so readers never see one without
//! the other.

use inforobot_common::types::RequestStatus;
use std::sync::Arc;
use tracing::info;

use super::store::{RequestStore, StoreError, StoreResult};

#[derive(Clone)]
pub struct StatusUpdater {
    store: Arc<dyn RequestStore>,
}

impl StatusUpdater {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    /// Atomically set status and content, releasing the worker's claim
    ///
    /// COMPLETE with blank content is refused so a finished request always
    /// carries its extracted text.
    #[tracing::instrument(skip(self, content), fields(content_len = content.len()))]
    pub async fn set(
        &self,
        index_id: &str,
        status: RequestStatus,
        content: &str,
    ) -> StoreResult<()> {
        if status == RequestStatus::Complete && content.trim().is_empty() {
            return Err(StoreError::InvalidTransition(
                "complete requires non-empty content".to_string(),
            ));
        }

        self.store.update_status(index_id, status, content).await?;
        info!(%status, "Request status updated");
        Ok(())
    }
}
