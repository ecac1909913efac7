//! Process-wide enrichment throttle
//!
//! Every worker loop shares one [`ThrottledEnrichment`], so the outbound call
//! rate stays at or below the configured rate no matter how many loops run.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use super::enrichment::{EnrichmentError, EnrichmentService};

/// Spaces calls to the wrapped service at least `min_interval` apart
pub struct ThrottledEnrichment {
    inner: Arc<dyn EnrichmentService>,
    ticker: Mutex<Interval>,
}

impl ThrottledEnrichment {
    /// Must be called inside a Tokio runtime; `min_interval` must be non-zero
    pub fn new(inner: Arc<dyn EnrichmentService>, min_interval: Duration) -> Self {
        let mut ticker = tokio::time::interval(min_interval);
        // A quiet spell must not bank a burst of calls
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            inner,
            ticker: Mutex::new(ticker),
        }
    }

    /// Wrap `inner` when a rate is configured, otherwise hand it back unchanged
    pub fn wrap(
        inner: Arc<dyn EnrichmentService>,
        min_interval: Option<Duration>,
    ) -> Arc<dyn EnrichmentService> {
        match min_interval {
            Some(interval) if !interval.is_zero() => Arc::new(Self::new(inner, interval)),
            _ => inner,
        }
    }
}

#[async_trait]
impl EnrichmentService for ThrottledEnrichment {
    async fn extract(&self, url: &str) -> Result<String, EnrichmentError> {
        // The lock is held across the tick so waiting callers queue up in order
        self.ticker.lock().await.tick().await;
        debug!(url, "Enrichment slot acquired");
        self.inner.extract(url).await
    }
}
