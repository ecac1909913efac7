//! Reconciliation sweep
//!
//! Re-enqueues every unfinished request. The queue collapses an enqueue onto
//! an already active job for the same request, so repeated sweeps over a
//! backlog do not pile up copies. The sweep also purges old finished jobs.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::error::PipelineError;
use super::jobs::{Job, ProcessUrlJob};
use super::queue::JobQueue;
use super::store::RequestStore;
use crate::config::DEFAULT_QUEUE_RETENTION_DAYS;

pub struct ReconciliationSweep {
    store: Arc<dyn RequestStore>,
    queue: Arc<dyn JobQueue>,
    retention: Duration,
}

impl ReconciliationSweep {
    pub fn new(store: Arc<dyn RequestStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            store,
            queue,
            retention: Duration::from_secs(DEFAULT_QUEUE_RETENTION_DAYS * 24 * 60 * 60),
        }
    }

    /// How long done and dead jobs are kept before [`Self::purge_finished_jobs`] drops them
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Enqueue one processing job per unfinished request; returns how many
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize, PipelineError> {
        let unfinished = self.store.list_unfinished().await?;

        for request in &unfinished {
            self.queue
                .enqueue(Job::ProcessUrl(ProcessUrlJob::from(request)))
                .await?;
        }

        info!(enqueued = unfinished.len(), "Reconciliation sweep finished");
        Ok(unfinished.len())
    }

    /// Drop finished jobs past retention; failures are logged, not raised
    pub async fn purge_finished_jobs(&self) -> u64 {
        match self.queue.purge_finished(self.retention).await {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, "Purged finished jobs");
                }
                purged
            },
            Err(e) => {
                warn!(error = %e, "Failed to purge finished jobs");
                0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::memory::{InMemoryJobQueue, InMemoryRequestStore};
    use inforobot_common::types::RequestStatus;

    fn sweep(
        store: &Arc<InMemoryRequestStore>,
        queue: &Arc<InMemoryJobQueue>,
    ) -> ReconciliationSweep {
        ReconciliationSweep::new(store.clone(), queue.clone())
    }

    #[tokio::test]
    async fn test_empty_store_enqueues_nothing() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());

        assert_eq!(sweep(&store, &queue).run_once().await.unwrap(), 0);
        assert!(queue.enqueued().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_and_failed_enqueued_in_creation_order() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let a = store.create("https://a.example").await.unwrap();
        let b = store.create("https://b.example").await.unwrap();
        let c = store.create("https://c.example").await.unwrap();
        store
            .update_status(&b.index_id, RequestStatus::Complete, "done")
            .await
            .unwrap();
        store
            .update_status(&c.index_id, RequestStatus::Failed, "HTTP error 500")
            .await
            .unwrap();

        assert_eq!(sweep(&store, &queue).run_once().await.unwrap(), 2);
        assert_eq!(
            queue.enqueued().await,
            vec![
                Job::ProcessUrl(ProcessUrlJob::new("https://a.example", a.index_id)),
                Job::ProcessUrl(ProcessUrlJob::new("https://c.example", c.index_id)),
            ]
        );
    }

    #[tokio::test]
    async fn test_row_left_pending_is_enqueued_by_each_sweep() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        store.create("https://a.example").await.unwrap();

        let s = sweep(&store, &queue);
        assert_eq!(s.run_once().await.unwrap(), 1);
        assert_eq!(s.run_once().await.unwrap(), 1);

        // Two enqueue calls, one job waiting
        assert_eq!(queue.enqueued().await.len(), 2);
        assert_eq!(queue.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_respects_retention() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let id = queue.enqueue(Job::Reconcile).await.unwrap();
        queue.dequeue("w").await.unwrap().unwrap();
        queue.ack(id).await.unwrap();

        assert_eq!(sweep(&store, &queue).purge_finished_jobs().await, 0);

        let eager = ReconciliationSweep::new(store.clone(), queue.clone())
            .with_retention(Duration::ZERO);
        assert_eq!(eager.purge_finished_jobs().await, 1);
        assert!(queue.job_info(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_claim_not_enqueued_until_expired() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let req = store.create("https://a.example").await.unwrap();
        store
            .claim(&req.index_id, std::time::Duration::from_secs(300))
            .await
            .unwrap();

        let s = sweep(&store, &queue);
        assert_eq!(s.run_once().await.unwrap(), 0);

        store.expire_claims().await;
        assert_eq!(s.run_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_outage_propagates() {
        let store = Arc::new(InMemoryRequestStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        store.create("https://a.example").await.unwrap();
        queue.set_unavailable(true);

        let result = sweep(&store, &queue).run_once().await;
        assert!(matches!(result, Err(PipelineError::Queue(_))));
    }
}
