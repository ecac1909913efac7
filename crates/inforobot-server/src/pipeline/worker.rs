//! Processing worker
//!
//! Handles one `ProcessUrl` job: claim the request, call the enrichment
//! service, and record exactly one terminal outcome. Only rate limiting is
//! retried in-job; every other failure is recorded as FAILED and left for the
//! next reconciliation sweep.

use inforobot_common::types::RequestStatus;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::enrichment::{EnrichmentError, EnrichmentService};
use super::error::PipelineError;
use super::jobs::ProcessUrlJob;
use super::models::ClaimOutcome;
use super::status::StatusUpdater;
use super::store::{RequestStore, StoreError};
use crate::config::{PipelineConfig, DEFAULT_PIPELINE_MAX_BACKOFF_SECS};

/// Bounded exponential backoff for rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Longest single wait, including one stretched by `Retry-After`
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(DEFAULT_PIPELINE_MAX_BACKOFF_SECS),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Upper bound on the total time spent sleeping between attempts
    ///
    /// A `Retry-After` hint can stretch any wait up to `max_delay`, so every
    /// gap counts at the cap.
    pub fn worst_case_wait(&self) -> Duration {
        self.max_delay
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay())
            .with_max_delay(config.max_backoff())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyComplete,
    /// Row deleted before or during processing
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed,
    Skipped(SkipReason),
}

pub struct ProcessingWorker {
    store: Arc<dyn RequestStore>,
    updater: StatusUpdater,
    enrichment: Arc<dyn EnrichmentService>,
    retry: RetryPolicy,
    claim_lease: Duration,
}

impl ProcessingWorker {
    pub fn new(
        store: Arc<dyn RequestStore>,
        enrichment: Arc<dyn EnrichmentService>,
        retry: RetryPolicy,
        claim_lease: Duration,
    ) -> Self {
        Self {
            updater: StatusUpdater::new(store.clone()),
            store,
            enrichment,
            retry,
            claim_lease,
        }
    }

    /// Process one job end to end
    ///
    /// Returns `Err` when the outcome could not be persisted or another worker
    /// holds the claim; the caller must then nack the job.
    #[tracing::instrument(skip(self, job), fields(index_id = %job.index_id, url = %job.url))]
    pub async fn process(&self, job: &ProcessUrlJob) -> Result<ProcessOutcome, PipelineError> {
        match self.store.claim(&job.index_id, self.claim_lease).await? {
            ClaimOutcome::Claimed => {},
            ClaimOutcome::AlreadyComplete => {
                info!("Request already complete, skipping");
                return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyComplete));
            },
            ClaimOutcome::Busy => {
                info!("Request claimed by another worker, handing job back");
                return Err(PipelineError::Claimed(job.index_id.clone()));
            },
            ClaimOutcome::Missing => {
                warn!("Request no longer exists, skipping");
                return Ok(ProcessOutcome::Skipped(SkipReason::Missing));
            },
        }

        let (status, content) = match self.extract_with_retry(&job.url).await {
            Ok(content) => (RequestStatus::Complete, content),
            Err(err) => {
                warn!(error = %err, "Enrichment failed");
                (RequestStatus::Failed, err.to_string())
            },
        };

        match self.updater.set(&job.index_id, status, &content).await {
            Ok(()) => {},
            Err(StoreError::NotFound(_)) => {
                warn!("Request deleted while processing, dropping result");
                return Ok(ProcessOutcome::Skipped(SkipReason::Missing));
            },
            Err(e) => {
                // Drop the lease so the redelivered job can claim the row
                if let Err(release_err) = self.store.release(&job.index_id).await {
                    warn!(error = %release_err, "Failed to release claim after write failure");
                }
                return Err(e.into());
            },
        }

        Ok(match status {
            RequestStatus::Complete => ProcessOutcome::Completed,
            _ => ProcessOutcome::Failed,
        })
    }

    async fn extract_with_retry(&self, url: &str) -> Result<String, PipelineError> {
        let mut attempt = 1;

        loop {
            match self.enrichment.extract(url).await {
                Ok(content) => return Ok(content),
                Err(EnrichmentError::RateLimited { retry_after }) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(PipelineError::RateLimited { attempts: attempt });
                    }

                    let delay = self
                        .retry
                        .backoff(attempt)
                        .max(retry_after.unwrap_or_default())
                        .min(self.retry.max_delay);
                    warn!(attempt, delay_secs = delay.as_secs_f64(), "Rate limited, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(PipelineError::Enrichment(e)),
            }
        }
    }
}
