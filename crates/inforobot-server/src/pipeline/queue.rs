//! At-least-once job queue
//!
//! Jobs live in the `pipeline_jobs` table. A worker claims the oldest ready
//! job with `FOR UPDATE SKIP LOCKED`, so concurrent workers never receive the
//! same delivery. A job stays `running` until it is acked or nacked; if the
//! worker dies first, the job becomes visible again once `locked_until`
//! passes. Handlers must therefore be idempotent.
//!
//! Enqueue is deduplicated: while a job with the same [`Job::dedupe_key`] is
//! queued or running, enqueueing returns that job's id instead of inserting a
//! second row. Finished and dead jobs are kept for inspection until
//! [`JobQueue::purge_finished`] removes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::jobs::Job;
use crate::config::PipelineConfig;

pub type JobId = i64;

/// Upper bound on the delay between redeliveries of a nacked job
pub const MAX_REDELIVERY_DELAY: Duration = Duration::from_secs(15 * 60);

/// Insert-or-find rounds before giving up on a contended dedupe key
const MAX_ENQUEUE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Done,
    /// Gave up after too many deliveries or an undecodable payload
    Dead,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Dead => "dead",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "done" => Ok(JobState::Done),
            "dead" => Ok(JobState::Dead),
            other => Err(QueueError::Corrupt(format!("unknown job state '{}'", other))),
        }
    }
}

/// A job handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: JobId,
    pub job: Job,
    /// 1 on first delivery
    pub deliveries: i32,
}

/// Queue-side view of a job, exposed through the jobs API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub kind: String,
    pub state: JobState,
    pub deliveries: i32,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What happened to a nacked job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeued { delay: Duration },
    Dead,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to encode job payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Corrupt queue data: {0}")]
    Corrupt(String),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Queue seam between producers (submission, sweep, timer) and workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job, or return the id of the active job with the same dedupe key
    async fn enqueue(&self, job: Job) -> QueueResult<JobId>;

    /// Claim the next ready job for `worker_id`, if any
    async fn dequeue(&self, worker_id: &str) -> QueueResult<Option<Delivery>>;

    /// Mark a delivery as successfully handled
    async fn ack(&self, id: JobId) -> QueueResult<()>;

    /// Hand a delivery back after a failure; requeues with backoff or buries it
    async fn nack(&self, delivery: &Delivery, error: &str) -> QueueResult<RetryDecision>;

    async fn job_info(&self, id: JobId) -> QueueResult<Option<JobInfo>>;

    /// Delete done and dead jobs that finished at least `older_than` ago
    async fn purge_finished(&self, older_than: Duration) -> QueueResult<u64>;
}

/// Queue tuning shared by every implementation
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// How long a claimed job stays invisible to other workers
    pub visibility_timeout: Duration,
    /// Deliveries before a job is buried
    pub max_deliveries: i32,
    /// Delay before the first redelivery; doubles each time
    pub retry_base_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(crate::config::DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS),
            max_deliveries: crate::config::DEFAULT_QUEUE_MAX_DELIVERIES,
            retry_base_delay: Duration::from_secs(crate::config::DEFAULT_PIPELINE_RETRY_BASE_DELAY_SECS),
        }
    }
}

impl From<&PipelineConfig> for QueueSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            visibility_timeout: config.queue_visibility_timeout(),
            max_deliveries: config.queue_max_deliveries,
            retry_base_delay: config.retry_base_delay(),
        }
    }
}

impl QueueSettings {
    /// Decide whether a failed delivery is retried and after how long
    pub fn decide(&self, deliveries: i32) -> RetryDecision {
        if deliveries >= self.max_deliveries {
            return RetryDecision::Dead;
        }
        let exponent = deliveries.saturating_sub(1).clamp(0, 16) as u32;
        let delay = self
            .retry_base_delay
            .saturating_mul(2u32.pow(exponent))
            .min(MAX_REDELIVERY_DELAY);
        RetryDecision::Requeued { delay }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimedRow {
    id: i64,
    payload: serde_json::Value,
    deliveries: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct JobInfoRow {
    id: i64,
    kind: String,
    status: String,
    deliveries: i32,
    last_error: Option<String>,
    run_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobInfoRow> for JobInfo {
    type Error = QueueError;

    fn try_from(row: JobInfoRow) -> Result<Self, Self::Error> {
        Ok(JobInfo {
            id: row.id,
            kind: row.kind,
            state: row.status.parse()?,
            deliveries: row.deliveries,
            last_error: row.last_error,
            run_at: row.run_at,
            created_at: row.created_at,
            finished_at: row.finished_at,
        })
    }
}

/// PostgreSQL-backed job queue
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    settings: QueueSettings,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, settings: QueueSettings) -> Self {
        Self { pool, settings }
    }

    async fn bury(&self, id: JobId, reason: &str) -> QueueResult<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_jobs
            SET status = 'dead', finished_at = NOW(), locked_by = NULL,
                locked_until = NULL, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        warn!(job_id = id, reason, "Job moved to dead state");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[tracing::instrument(skip(self, job), fields(kind = job.kind()))]
    async fn enqueue(&self, job: Job) -> QueueResult<JobId> {
        let payload = serde_json::to_value(&job).map_err(QueueError::Encode)?;
        let dedupe_key = job.dedupe_key();

        for _ in 0..MAX_ENQUEUE_ATTEMPTS {
            let inserted: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO pipeline_jobs (kind, payload, dedupe_key)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                RETURNING id
                "#,
            )
            .bind(job.kind())
            .bind(&payload)
            .bind(&dedupe_key)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = inserted {
                debug!(job_id = id, "Job enqueued");
                return Ok(id);
            }

            // The active job may finish between the insert and this lookup
            let active: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM pipeline_jobs
                WHERE dedupe_key = $1 AND status IN ('queued', 'running')
                "#,
            )
            .bind(&dedupe_key)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = active {
                debug!(job_id = id, %dedupe_key, "Job already active, not enqueued again");
                return Ok(id);
            }
        }

        Err(QueueError::Unavailable(format!(
            "could not enqueue '{}' after {} attempts",
            dedupe_key, MAX_ENQUEUE_ATTEMPTS
        )))
    }

    async fn dequeue(&self, worker_id: &str) -> QueueResult<Option<Delivery>> {
        loop {
            let row = sqlx::query_as::<_, ClaimedRow>(
                r#"
                UPDATE pipeline_jobs
                SET status = 'running',
                    deliveries = deliveries + 1,
                    locked_by = $1,
                    locked_until = NOW() + make_interval(secs => $2)
                WHERE id = (
                    SELECT id FROM pipeline_jobs
                    WHERE (status = 'queued' AND run_at <= NOW())
                       OR (status = 'running' AND locked_until < NOW())
                    ORDER BY run_at, id
                    FOR UPDATE SKIP LOCKED
                    LIMIT 1
                )
                RETURNING id, payload, deliveries
                "#,
            )
            .bind(worker_id)
            .bind(self.settings.visibility_timeout.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            // A redelivery past the limit means earlier workers died mid-job
            if row.deliveries > self.settings.max_deliveries {
                self.bury(row.id, "exceeded max deliveries").await?;
                continue;
            }

            match serde_json::from_value::<Job>(row.payload) {
                Ok(job) => {
                    return Ok(Some(Delivery {
                        id: row.id,
                        job,
                        deliveries: row.deliveries,
                    }))
                },
                Err(e) => {
                    self.bury(row.id, &format!("undecodable payload: {}", e)).await?;
                },
            }
        }
    }

    async fn ack(&self, id: JobId) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_jobs
            SET status = 'done', finished_at = NOW(), locked_by = NULL, locked_until = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(job_id = id, "Ack for a job that is no longer running");
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> QueueResult<RetryDecision> {
        let decision = self.settings.decide(delivery.deliveries);

        match decision {
            RetryDecision::Dead => self.bury(delivery.id, error).await?,
            RetryDecision::Requeued { delay } => {
                sqlx::query(
                    r#"
                    UPDATE pipeline_jobs
                    SET status = 'queued',
                        run_at = NOW() + make_interval(secs => $2),
                        locked_by = NULL,
                        locked_until = NULL,
                        last_error = $3
                    WHERE id = $1
                    "#,
                )
                .bind(delivery.id)
                .bind(delay.as_secs_f64())
                .bind(error)
                .execute(&self.pool)
                .await?;
            },
        }

        Ok(decision)
    }

    async fn job_info(&self, id: JobId) -> QueueResult<Option<JobInfo>> {
        sqlx::query_as::<_, JobInfoRow>(
            r#"
            SELECT id, kind, status, deliveries, last_error, run_at, created_at, finished_at
            FROM pipeline_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(JobInfo::try_from)
        .transpose()
    }

    async fn purge_finished(&self, older_than: Duration) -> QueueResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM pipeline_jobs
            WHERE status IN ('done', 'dead')
              AND finished_at <= NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::jobs::ProcessUrlJob;

    fn settings() -> QueueSettings {
        QueueSettings {
            visibility_timeout: Duration::from_secs(60),
            max_deliveries: 3,
            retry_base_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_settings_from_pipeline_config() {
        let config = PipelineConfig {
            queue_visibility_timeout_secs: 120,
            queue_max_deliveries: 7,
            retry_base_delay_secs: 2,
            ..PipelineConfig::default()
        };

        let settings = QueueSettings::from(&config);

        assert_eq!(settings.visibility_timeout, Duration::from_secs(120));
        assert_eq!(settings.max_deliveries, 7);
        assert_eq!(settings.retry_base_delay, Duration::from_secs(2));
    }

    fn sample_job() -> Job {
        Job::from(ProcessUrlJob::new("https://example.com", "abc"))
    }

    #[test]
    fn test_decide_backs_off_exponentially() {
        let s = settings();
        assert_eq!(s.decide(1), RetryDecision::Requeued { delay: Duration::from_secs(10) });
        assert_eq!(s.decide(2), RetryDecision::Requeued { delay: Duration::from_secs(20) });
        assert_eq!(s.decide(3), RetryDecision::Dead);
    }

    #[test]
    fn test_decide_caps_delay() {
        let s = QueueSettings {
            max_deliveries: 100,
            ..settings()
        };
        assert_eq!(s.decide(50), RetryDecision::Requeued { delay: MAX_REDELIVERY_DELAY });
    }

    #[test]
    fn test_job_state_round_trips_through_str() {
        for state in [JobState::Queued, JobState::Running, JobState::Done, JobState::Dead] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("pending".parse::<JobState>().is_err());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_enqueue_dequeue_ack(pool: PgPool) {
        let queue = PgJobQueue::new(pool, settings());
        let id = queue.enqueue(sample_job()).await.unwrap();

        let delivery = queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(delivery.id, id);
        assert_eq!(delivery.job, sample_job());
        assert_eq!(delivery.deliveries, 1);

        // Claimed jobs are invisible to other workers
        assert!(queue.dequeue("w2").await.unwrap().is_none());

        queue.ack(id).await.unwrap();
        let info = queue.job_info(id).await.unwrap().unwrap();
        assert_eq!(info.state, JobState::Done);
        assert!(info.finished_at.is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_dequeue_is_fifo(pool: PgPool) {
        let queue = PgJobQueue::new(pool, settings());
        let first = queue.enqueue(sample_job()).await.unwrap();
        let second = queue.enqueue(Job::Reconcile).await.unwrap();

        assert_eq!(queue.dequeue("w").await.unwrap().unwrap().id, first);
        assert_eq!(queue.dequeue("w").await.unwrap().unwrap().id, second);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_nack_requeues_then_buries(pool: PgPool) {
        let queue = PgJobQueue::new(
            pool.clone(),
            QueueSettings {
                max_deliveries: 2,
                retry_base_delay: Duration::ZERO,
                ..settings()
            },
        );
        let id = queue.enqueue(sample_job()).await.unwrap();

        let first = queue.dequeue("w").await.unwrap().unwrap();
        let decision = queue.nack(&first, "db down").await.unwrap();
        assert_eq!(decision, RetryDecision::Requeued { delay: Duration::ZERO });

        let second = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(second.deliveries, 2);
        assert_eq!(queue.nack(&second, "db down").await.unwrap(), RetryDecision::Dead);

        let info = queue.job_info(id).await.unwrap().unwrap();
        assert_eq!(info.state, JobState::Dead);
        assert_eq!(info.last_error.as_deref(), Some("db down"));
        assert!(queue.dequeue("w").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_expired_visibility_redelivers(pool: PgPool) {
        let queue = PgJobQueue::new(pool.clone(), settings());
        let id = queue.enqueue(sample_job()).await.unwrap();
        queue.dequeue("crashed-worker").await.unwrap().unwrap();

        sqlx::query("UPDATE pipeline_jobs SET locked_until = NOW() - INTERVAL '1 second'")
            .execute(&pool)
            .await
            .unwrap();

        let redelivered = queue.dequeue("w2").await.unwrap().unwrap();
        assert_eq!(redelivered.id, id);
        assert_eq!(redelivered.deliveries, 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_undecodable_payload_is_buried(pool: PgPool) {
        let queue = PgJobQueue::new(pool.clone(), settings());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO pipeline_jobs (kind, payload) VALUES ('mystery', '{\"kind\":\"mystery\"}') RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert!(queue.dequeue("w").await.unwrap().is_none());
        let info = queue.job_info(id).await.unwrap().unwrap();
        assert_eq!(info.state, JobState::Dead);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_enqueue_collapses_onto_active_job(pool: PgPool) {
        let queue = PgJobQueue::new(pool.clone(), settings());
        let first = queue.enqueue(sample_job()).await.unwrap();
        assert_eq!(queue.enqueue(sample_job()).await.unwrap(), first);

        // Still deduplicated while running
        queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(queue.enqueue(sample_job()).await.unwrap(), first);

        // Once finished, the same work can be queued again
        queue.ack(first).await.unwrap();
        let second = queue.enqueue(sample_job()).await.unwrap();
        assert_ne!(second, first);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_reconcile_jobs_are_deduplicated(pool: PgPool) {
        let queue = PgJobQueue::new(pool, settings());
        let first = queue.enqueue(Job::Reconcile).await.unwrap();
        assert_eq!(queue.enqueue(Job::Reconcile).await.unwrap(), first);
        assert_ne!(queue.enqueue(sample_job()).await.unwrap(), first);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_purge_finished_keeps_recent_and_active_jobs(pool: PgPool) {
        let queue = PgJobQueue::new(pool.clone(), settings());
        let old = queue.enqueue(sample_job()).await.unwrap();
        queue.dequeue("w").await.unwrap().unwrap();
        queue.ack(old).await.unwrap();
        sqlx::query("UPDATE pipeline_jobs SET finished_at = NOW() - INTERVAL '8 days' WHERE id = $1")
            .bind(old)
            .execute(&pool)
            .await
            .unwrap();

        let recent = queue
            .enqueue(Job::from(ProcessUrlJob::new("https://example.com", "recent")))
            .await
            .unwrap();
        queue.dequeue("w").await.unwrap().unwrap();
        queue.ack(recent).await.unwrap();
        let active = queue.enqueue(Job::Reconcile).await.unwrap();

        let week = Duration::from_secs(7 * 24 * 60 * 60);
        assert_eq!(queue.purge_finished(week).await.unwrap(), 1);

        assert!(queue.job_info(old).await.unwrap().is_none());
        assert!(queue.job_info(recent).await.unwrap().is_some());
        assert!(queue.job_info(active).await.unwrap().is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_job_info_missing(pool: PgPool) {
        let queue = PgJobQueue::new(pool, settings());
        assert!(queue.job_info(424242).await.unwrap().is_none());
    }
}
