pub mod embedding_backfill;
pub mod rating_reconcile;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::events::ListingEvents;
use crate::store::Store;
use crate::tutoring::rating::RatingAggregator;
use crate::tutoring::subjects::SubjectRegistry;

/// Timeout for individual worker invocations (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    RatingReconcile,
    EmbeddingBackfill,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RatingReconcile => "rating_reconcile",
            Self::EmbeddingBackfill => "embedding_backfill",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    aggregator: RatingAggregator,
    registry: SubjectRegistry,
    events: ListingEvents,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        aggregator: RatingAggregator,
        registry: SubjectRegistry,
        events: ListingEvents,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            registry,
            events,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Every job this instance would schedule, with its cron expression.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::RatingReconcile,
                cron: "0 */15 * * * *",
                enabled: self.config.enable_rating_reconcile,
            },
            JobSpec {
                name: WorkerName::EmbeddingBackfill,
                cron: "0 */10 * * * *",
                enabled: self.config.enable_embedding_backfill,
            },
        ]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot be created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        self.register_jobs(&scheduler).await;
        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for job in self.planned_jobs() {
            if !job.enabled {
                tracing::info!(name = job.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let name_str = job.name.as_str();

            match job.name {
                WorkerName::RatingReconcile => {
                    let aggregator = self.aggregator.clone();
                    let events = self.events.clone();
                    add_job(scheduler, job.cron, name_str, move || {
                        let store = store.clone();
                        let aggregator = aggregator.clone();
                        let events = events.clone();
                        async move {
                            rating_reconcile::run(&store, &aggregator, &events).await;
                        }
                    })
                    .await;
                }
                WorkerName::EmbeddingBackfill => {
                    let registry = self.registry.clone();
                    add_job(scheduler, job.cron, name_str, move || {
                        let store = store.clone();
                        let registry = registry.clone();
                        async move {
                            embedding_backfill::run(&store, &registry).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = job.cron, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            if tokio::time::timeout(WORKER_TIMEOUT, fut).await.is_err() {
                tracing::error!(
                    worker = name,
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Worker timed out"
                );
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error = %err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error = %err, cron, worker = name, "Failed to create worker job"),
    }
}
