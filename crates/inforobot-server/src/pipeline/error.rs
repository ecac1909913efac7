//! Pipeline error taxonomy

use thiserror::Error;

use super::enrichment::EnrichmentError;
use super::queue::QueueError;
use super::store::StoreError;

/// Errors surfaced by workers and the sweep
///
/// The worker records `RateLimited` and `Enrichment` on the request as FAILED.
/// `Claimed`, `Persistence`, and `Queue` propagate to the runtime, which nacks
/// the job so the queue redelivers it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request '{0}' not found")]
    NotFound(String),

    #[error("Request '{0}' is claimed by another worker")]
    Claimed(String),

    #[error("Rate limited by enrichment service after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Enrichment failed: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl PipelineError {
    /// Whether the failure is the external service's fault rather than ours
    pub fn is_enrichment_failure(&self) -> bool {
        matches!(self, PipelineError::RateLimited { .. } | PipelineError::Enrichment(_))
    }
}
