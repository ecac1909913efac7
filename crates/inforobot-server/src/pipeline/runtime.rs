//! Worker loops and the periodic sweep trigger
//!
//! [`PipelineRuntime::start`] spawns `workers` loops that drain the shared
//! queue plus one timer task that enqueues a `Reconcile` job every sweep
//! interval. Cancellation is checked between jobs, so in-flight work finishes
//! before a loop exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::enrichment::EnrichmentService;
use super::error::PipelineError;
use super::jobs::Job;
use super::queue::{JobQueue, QueueError};
use super::store::RequestStore;
use super::sweep::ReconciliationSweep;
use super::throttle::ThrottledEnrichment;
use super::worker::{ProcessingWorker, RetryPolicy};
use crate::config::PipelineConfig;

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub workers: usize,
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
}

impl From<&PipelineConfig> for RuntimeSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            poll_interval: config.poll_interval(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

/// Routes each job variant to its handler
pub struct JobDispatcher {
    worker: ProcessingWorker,
    sweep: ReconciliationSweep,
}

impl JobDispatcher {
    pub fn new(worker: ProcessingWorker, sweep: ReconciliationSweep) -> Self {
        Self { worker, sweep }
    }

    pub async fn dispatch(&self, job: &Job) -> Result<(), PipelineError> {
        match job {
            Job::ProcessUrl(job) => {
                let outcome = self.worker.process(job).await?;
                debug!(index_id = %job.index_id, ?outcome, "Processing job handled");
                Ok(())
            },
            Job::Reconcile => {
                self.sweep.run_once().await?;
                self.sweep.purge_finished_jobs().await;
                Ok(())
            },
        }
    }
}

#[derive(Clone)]
pub struct PipelineRuntime {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    settings: RuntimeSettings,
}

impl PipelineRuntime {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dispatcher: Arc<JobDispatcher>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            settings,
        }
    }

    /// Wire worker, sweep, and dispatcher from configuration
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn RequestStore>,
        queue: Arc<dyn JobQueue>,
        enrichment: Arc<dyn EnrichmentService>,
    ) -> Self {
        let enrichment = ThrottledEnrichment::wrap(enrichment, config.enrich_min_interval());
        let worker = ProcessingWorker::new(
            store.clone(),
            enrichment,
            RetryPolicy::from(config),
            config.claim_lease(),
        );
        let sweep = ReconciliationSweep::new(store, queue.clone())
            .with_retention(config.queue_retention());
        let dispatcher = Arc::new(JobDispatcher::new(worker, sweep));

        Self::new(queue, dispatcher, RuntimeSettings::from(config))
    }

    /// Take one job off the queue, run it, and ack or nack it
    ///
    /// Returns `false` when the queue had nothing ready.
    pub async fn process_next(&self, worker_id: &str) -> Result<bool, QueueError> {
        let Some(delivery) = self.queue.dequeue(worker_id).await? else {
            return Ok(false);
        };

        match self.dispatcher.dispatch(&delivery.job).await {
            Ok(()) => self.queue.ack(delivery.id).await?,
            Err(err) => {
                error!(
                    job_id = delivery.id,
                    kind = delivery.job.kind(),
                    deliveries = delivery.deliveries,
                    error = %err,
                    "Job failed"
                );
                let decision = self.queue.nack(&delivery, &err.to_string()).await?;
                warn!(job_id = delivery.id, ?decision, "Job handed back to queue");
            },
        }

        Ok(true)
    }

    /// Spawn worker loops and the sweep timer
    pub fn start(&self) -> PipelineHandle {
        let token = CancellationToken::new();
        let host = hostname::get()
            .unwrap_or_else(|_| "unknown".into())
            .to_string_lossy()
            .to_string();

        let mut tasks = Vec::with_capacity(self.settings.workers + 1);
        for n in 0..self.settings.workers {
            let runtime = self.clone();
            let worker_id = format!("{}-{}-{}", host, std::process::id(), n);
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                runtime.worker_loop(worker_id, token).await;
            }));
        }

        tasks.push(tokio::spawn(sweep_timer(
            self.queue.clone(),
            self.settings.sweep_interval,
            token.clone(),
        )));

        info!(
            workers = self.settings.workers,
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "Pipeline runtime started"
        );

        PipelineHandle { token, tasks }
    }

    async fn worker_loop(self, worker_id: String, token: CancellationToken) {
        info!(%worker_id, "Worker started");

        while !token.is_cancelled() {
            match self.process_next(&worker_id).await {
                Ok(true) => continue,
                Ok(false) => {},
                Err(e) => error!(%worker_id, error = %e, "Queue error"),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {},
            }
        }

        info!(%worker_id, "Worker stopped");
    }
}

async fn sweep_timer(queue: Arc<dyn JobQueue>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => match queue.enqueue(Job::Reconcile).await {
                Ok(job_id) => debug!(job_id, "Reconciliation sweep scheduled"),
                Err(e) => error!(error = %e, "Failed to schedule reconciliation sweep"),
            },
        }
    }

    info!("Sweep timer stopped");
}

/// Running pipeline; dropping it leaves the tasks running
pub struct PipelineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Stop accepting new jobs and wait up to `grace` for in-flight ones
    pub async fn shutdown(mut self, grace: Duration) {
        self.token.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async {
            for task in tasks.iter_mut() {
                if let Err(e) = task.await {
                    error!(error = %e, "Pipeline task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Pipeline did not drain within grace period, aborting tasks");
            for task in &self.tasks {
                task.abort();
            }
        }

        info!("Pipeline runtime stopped");
    }
}
