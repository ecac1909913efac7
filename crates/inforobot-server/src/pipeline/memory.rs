//! In-process request store and job queue
//!
//! Intended for tests and local experiments. Nothing survives a restart, and
//! the queue has no visibility timeout: a delivery stays running until it is
//! acked or nacked.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inforobot_common::types::{IndexId, RequestStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::jobs::Job;
use super::models::{ClaimOutcome, IndexEntry, Request};
use super::queue::{
    Delivery, JobId, JobInfo, JobQueue, JobState, QueueError, QueueResult, QueueSettings,
    RetryDecision,
};
use super::store::{RequestStore, StoreError, StoreResult};

fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(365));
    now + lease
}

// ============================================================================
// Request Store
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    next_id: i64,
    rows: BTreeMap<i64, Request>,
    by_index: HashMap<String, i64>,
}

impl StoreState {
    fn row_mut(&mut self, index_id: &str) -> StoreResult<&mut Request> {
        let id = self
            .by_index
            .get(index_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(index_id.to_string()))?;
        self.rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(index_id.to_string()))
    }
}

/// Request store backed by a map
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    state: Mutex<StoreState>,
    unavailable: AtomicBool,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make row writes fail with [`StoreError::Unavailable`] until reset
    ///
    /// Claims and releases still succeed, which lets tests fail the result
    /// write alone.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All rows in insertion order
    pub async fn snapshot(&self) -> Vec<Request> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    /// Force every live claim to look abandoned
    pub async fn expire_claims(&self) {
        let past = Utc::now() - chrono::Duration::seconds(1);
        let mut state = self.state.lock().await;
        for row in state.rows.values_mut() {
            if row.claimed_until.is_some() {
                row.claimed_until = Some(past);
            }
        }
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(&self, url: &str) -> StoreResult<Request> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let mut index_id = IndexId::generate();
        while state.by_index.contains_key(index_id.as_str()) {
            index_id = IndexId::generate();
        }

        state.next_id += 1;
        let now = Utc::now();
        let request = Request {
            id: state.next_id,
            index_id: index_id.into_inner(),
            url: url.to_string(),
            content: None,
            status: RequestStatus::Pending,
            claimed_until: None,
            created_at: now,
            updated_at: now,
        };

        state.by_index.insert(request.index_id.clone(), request.id);
        state.rows.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, index_id: &str) -> StoreResult<Request> {
        let mut state = self.state.lock().await;
        state.row_mut(index_id).map(|row| row.clone())
    }

    async fn list_unfinished(&self) -> StoreResult<Vec<Request>> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|row| row.needs_processing(now))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        index_id: &str,
        status: RequestStatus,
        content: &str,
    ) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let row = state.row_mut(index_id)?;
        row.status = status;
        row.content = Some(content.to_string());
        row.claimed_until = None;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn claim(&self, index_id: &str, lease: Duration) -> StoreResult<ClaimOutcome> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let row = match state.row_mut(index_id) {
            Ok(row) => row,
            Err(StoreError::NotFound(_)) => return Ok(ClaimOutcome::Missing),
            Err(e) => return Err(e),
        };

        match row.status {
            RequestStatus::Complete => Ok(ClaimOutcome::AlreadyComplete),
            RequestStatus::Processing if row.claimed_until.is_some_and(|until| until >= now) => {
                Ok(ClaimOutcome::Busy)
            },
            _ => {
                row.status = RequestStatus::Processing;
                row.claimed_until = Some(lease_deadline(now, lease));
                row.updated_at = now;
                Ok(ClaimOutcome::Claimed)
            },
        }
    }

    async fn release(&self, index_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Ok(row) = state.row_mut(index_id) {
            if row.status == RequestStatus::Processing {
                row.claimed_until = None;
                row.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn update_content(
        &self,
        index_id: &str,
        content: &str,
        status: Option<RequestStatus>,
    ) -> StoreResult<Request> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let row = state.row_mut(index_id)?;
        row.content = Some(content.to_string());
        if let Some(status) = status {
            row.status = status;
        }
        row.claimed_until = None;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, index_id: &str) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let id = state
            .by_index
            .remove(index_id)
            .ok_or_else(|| StoreError::NotFound(index_id.to_string()))?;
        state.rows.remove(&id);
        Ok(())
    }

    async fn list_index(&self) -> StoreResult<Vec<IndexEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .map(|row| IndexEntry {
                index_id: row.index_id.clone(),
                address: row.url.clone(),
            })
            .collect())
    }
}

// ============================================================================
// Job Queue
// ============================================================================

#[derive(Debug)]
struct QueuedJob {
    job: Job,
    state: JobState,
    deliveries: i32,
    ready_at: Instant,
    run_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: JobId,
    jobs: BTreeMap<JobId, QueuedJob>,
    history: Vec<Job>,
}

/// FIFO job queue backed by a map
#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    settings: QueueSettings,
    unavailable: AtomicBool,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::with_settings(QueueSettings {
            retry_base_delay: Duration::ZERO,
            ..QueueSettings::default()
        })
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            settings,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make enqueue fail with [`QueueError::Unavailable`] until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every enqueue call, in order, including ones collapsed onto an active job
    pub async fn enqueued(&self) -> Vec<Job> {
        self.state.lock().await.history.clone()
    }

    /// Jobs still waiting for a worker
    pub async fn pending(&self) -> Vec<Job> {
        self.state
            .lock()
            .await
            .jobs
            .values()
            .filter(|j| j.state == JobState::Queued)
            .map(|j| j.job.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("simulated outage".to_string()));
        }

        let mut state = self.state.lock().await;
        state.history.push(job.clone());

        let key = job.dedupe_key();
        let active = state
            .jobs
            .iter()
            .find(|(_, j)| {
                matches!(j.state, JobState::Queued | JobState::Running) && j.job.dedupe_key() == key
            })
            .map(|(id, _)| *id);
        if let Some(id) = active {
            return Ok(id);
        }

        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();

        state.jobs.insert(
            id,
            QueuedJob {
                job,
                state: JobState::Queued,
                deliveries: 0,
                ready_at: Instant::now(),
                run_at: now,
                last_error: None,
                created_at: now,
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn dequeue(&self, _worker_id: &str) -> QueueResult<Option<Delivery>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let next = state
            .jobs
            .iter()
            .filter(|(_, j)| j.state == JobState::Queued && j.ready_at <= now)
            .min_by_key(|(id, j)| (j.ready_at, **id))
            .map(|(id, _)| *id);

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(entry) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };

        entry.state = JobState::Running;
        entry.deliveries += 1;
        Ok(Some(Delivery {
            id,
            job: entry.job.clone(),
            deliveries: entry.deliveries,
        }))
    }

    async fn ack(&self, id: JobId) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.jobs.get_mut(&id) {
            entry.state = JobState::Done;
            entry.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> QueueResult<RetryDecision> {
        let decision = self.settings.decide(delivery.deliveries);
        let mut state = self.state.lock().await;

        if let Some(entry) = state.jobs.get_mut(&delivery.id) {
            entry.last_error = Some(error.to_string());
            match decision {
                RetryDecision::Dead => {
                    entry.state = JobState::Dead;
                    entry.finished_at = Some(Utc::now());
                },
                RetryDecision::Requeued { delay } => {
                    entry.state = JobState::Queued;
                    entry.ready_at = Instant::now() + delay;
                    entry.run_at = lease_deadline(Utc::now(), delay);
                },
            }
        }
        Ok(decision)
    }

    async fn job_info(&self, id: JobId) -> QueueResult<Option<JobInfo>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).map(|j| JobInfo {
            id,
            kind: j.job.kind().to_string(),
            state: j.state,
            deliveries: j.deliveries,
            last_error: j.last_error.clone(),
            run_at: j.run_at,
            created_at: j.created_at,
            finished_at: j.finished_at,
        }))
    }

    async fn purge_finished(&self, older_than: Duration) -> QueueResult<u64> {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, j| {
            !matches!(j.state, JobState::Done | JobState::Dead)
                || j.finished_at.map_or(true, |at| at > cutoff)
        });
        Ok((before - state.jobs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::jobs::ProcessUrlJob;

    #[tokio::test]
    async fn test_store_claim_lifecycle() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();
        let lease = Duration::from_secs(60);

        assert_eq!(store.claim(&req.index_id, lease).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(store.claim(&req.index_id, lease).await.unwrap(), ClaimOutcome::Busy);
        assert!(store.list_unfinished().await.unwrap().is_empty());

        store.expire_claims().await;
        assert_eq!(store.list_unfinished().await.unwrap().len(), 1);

        store
            .update_status(&req.index_id, RequestStatus::Complete, "text")
            .await
            .unwrap();
        assert_eq!(
            store.claim(&req.index_id, lease).await.unwrap(),
            ClaimOutcome::AlreadyComplete
        );
        assert_eq!(store.claim("ghost", lease).await.unwrap(), ClaimOutcome::Missing);
    }

    #[tokio::test]
    async fn test_store_release_reopens_claim() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();
        let lease = Duration::from_secs(60);
        store.claim(&req.index_id, lease).await.unwrap();

        store.release(&req.index_id).await.unwrap();
        assert_eq!(store.claim(&req.index_id, lease).await.unwrap(), ClaimOutcome::Claimed);

        // Releasing a finished or missing row is a no-op
        store
            .update_status(&req.index_id, RequestStatus::Complete, "text")
            .await
            .unwrap();
        store.release(&req.index_id).await.unwrap();
        store.release("ghost").await.unwrap();
        assert_eq!(
            store.get(&req.index_id).await.unwrap().status,
            RequestStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_store_outage_blocks_writes_not_reads() {
        let store = InMemoryRequestStore::new();
        let req = store.create("https://example.com").await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            store.update_status(&req.index_id, RequestStatus::Failed, "x").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get(&req.index_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_fifo_and_states() {
        let queue = InMemoryJobQueue::new();
        let a = queue
            .enqueue(Job::from(ProcessUrlJob::new("https://a.example", "a")))
            .await
            .unwrap();
        let b = queue.enqueue(Job::Reconcile).await.unwrap();

        let first = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(first.id, a);
        queue.ack(a).await.unwrap();

        let second = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(second.id, b);
        assert!(queue.dequeue("w").await.unwrap().is_none());

        assert_eq!(queue.job_info(a).await.unwrap().unwrap().state, JobState::Done);
        assert_eq!(queue.job_info(b).await.unwrap().unwrap().state, JobState::Running);
        assert_eq!(queue.enqueued().await.len(), 2);
    }

    #[tokio::test]
    async fn test_queue_nack_until_dead() {
        let queue = InMemoryJobQueue::with_settings(QueueSettings {
            max_deliveries: 2,
            retry_base_delay: Duration::ZERO,
            ..QueueSettings::default()
        });
        let id = queue.enqueue(Job::Reconcile).await.unwrap();

        let d1 = queue.dequeue("w").await.unwrap().unwrap();
        assert!(matches!(
            queue.nack(&d1, "boom").await.unwrap(),
            RetryDecision::Requeued { .. }
        ));
        let d2 = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(d2.deliveries, 2);
        assert_eq!(queue.nack(&d2, "boom").await.unwrap(), RetryDecision::Dead);

        let info = queue.job_info(id).await.unwrap().unwrap();
        assert_eq!(info.state, JobState::Dead);
        assert_eq!(info.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_queue_collapses_duplicate_active_jobs() {
        let queue = InMemoryJobQueue::new();
        let job = Job::from(ProcessUrlJob::new("https://a.example", "a"));

        let first = queue.enqueue(job.clone()).await.unwrap();
        assert_eq!(queue.enqueue(job.clone()).await.unwrap(), first);
        assert_eq!(queue.pending().await.len(), 1);

        queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(queue.enqueue(job.clone()).await.unwrap(), first);
        queue.ack(first).await.unwrap();

        assert_ne!(queue.enqueue(job).await.unwrap(), first);
        assert_eq!(queue.enqueued().await.len(), 4);
    }

    #[tokio::test]
    async fn test_queue_purges_only_finished_jobs() {
        let queue = InMemoryJobQueue::new();
        let done = queue.enqueue(Job::Reconcile).await.unwrap();
        queue.dequeue("w").await.unwrap().unwrap();
        queue.ack(done).await.unwrap();
        let queued = queue
            .enqueue(Job::from(ProcessUrlJob::new("https://a.example", "a")))
            .await
            .unwrap();

        let day = Duration::from_secs(24 * 60 * 60);
        assert_eq!(queue.purge_finished(day).await.unwrap(), 0);
        assert_eq!(queue.purge_finished(Duration::ZERO).await.unwrap(), 1);

        assert!(queue.job_info(done).await.unwrap().is_none());
        assert!(queue.job_info(queued).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_queue_outage_rejects_enqueue() {
        let queue = InMemoryJobQueue::new();
        queue.set_unavailable(true);
        assert!(matches!(
            queue.enqueue(Job::Reconcile).await,
            Err(QueueError::Unavailable(_))
        ));
        assert!(queue.enqueued().await.is_empty());
    }
}
