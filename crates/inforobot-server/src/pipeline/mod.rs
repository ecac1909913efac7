//! Asynchronous URL enrichment pipeline
//!
//! A submitted URL becomes a row in the request store and a job on the queue.
//! Workers pull jobs, claim the request, call the enrichment service, and write
//! the result back through the status updater. A periodic reconciliation sweep
//! re-enqueues every request that is not yet complete, so lost jobs and failed
//! attempts are picked up again.
//!
//! # Modules
//!
//! - [`store`]: durable request storage ([`RequestStore`], [`PgRequestStore`])
//! - [`queue`]: at-least-once job queue ([`JobQueue`], [`PgJobQueue`])
//! - [`memory`]: in-process implementations of both for tests and local runs
//! - [`enrichment`]: client for the external extraction model
//! - [`throttle`]: process-wide cap on the enrichment call rate
//! - [`status`]: atomic status/content writes
//! - [`worker`]: per-job processing with bounded rate-limit retry
//! - [`sweep`]: reconciliation of unfinished requests
//! - [`runtime`]: worker loops and the sweep timer

pub mod enrichment;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod models;
pub mod queue;
pub mod runtime;
pub mod status;
pub mod store;
pub mod sweep;
pub mod throttle;
pub mod worker;

pub use enrichment::{EnrichmentError, EnrichmentService, GrokClient};
pub use error::PipelineError;
pub use jobs::{Job, ProcessUrlJob};
pub use memory::{InMemoryJobQueue, InMemoryRequestStore};
pub use models::{ClaimOutcome, IndexEntry, Request};
pub use queue::{Delivery, JobId, JobInfo, JobQueue, JobState, PgJobQueue, QueueError};
pub use runtime::{JobDispatcher, PipelineHandle, PipelineRuntime, RuntimeSettings};
pub use status::StatusUpdater;
pub use store::{PgRequestStore, RequestStore, StoreError};
pub use sweep::ReconciliationSweep;
pub use throttle::ThrottledEnrichment;
pub use worker::{ProcessOutcome, ProcessingWorker, RetryPolicy, SkipReason};
