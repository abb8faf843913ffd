//! Worker pool: a fixed set of tokio tasks claiming jobs of given kinds.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job_queue::{JobQueue, QueuedJob};
use crate::Result;
use crate::database::models::JobKind;

/// Executes claimed jobs. Returning `Err` hands the job back to the queue's
/// retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn kinds(&self) -> &'static [JobKind];

    async fn handle(&self, job: &QueuedJob) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    /// A job running longer is abandoned and counted as a failed attempt.
    pub job_timeout: Duration,
    /// Fallback wake-up when no enqueue notification arrives.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            job_timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct WorkerPool {
    name: &'static str,
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    active_workers: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(name: &'static str, config: WorkerPoolConfig) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
            active_workers: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the workers. Each claims only the kinds `handler` accepts.
    pub fn start(&self, job_queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>) {
        let name = self.name;
        info!(
            "Starting {} worker pool with {} max workers",
            name, self.config.max_workers
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("{} worker pool already stopped", name);
            return;
        };

        for i in 0..self.config.max_workers {
            let worker = Worker {
                pool: name,
                index: i,
                job_queue: job_queue.clone(),
                handler: handler.clone(),
                semaphore: self.semaphore.clone(),
                active_workers: self.active_workers.clone(),
                cancellation_token: self.cancellation_token.clone(),
                job_timeout: self.config.job_timeout,
                poll_interval: self.config.poll_interval,
            };
            join_set.spawn(worker.run());
        }
    }

    pub async fn stop(&self) {
        info!("Stopping {} worker pool", self.name);
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("{} worker pool stopped", self.name);
    }

    /// Workers currently executing a job.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

struct Worker {
    pool: &'static str,
    index: usize,
    job_queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    semaphore: Arc<Semaphore>,
    active_workers: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    job_timeout: Duration,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self) {
        debug!("{} worker {} started", self.pool, self.index);
        let notifier = self.job_queue.notifier();

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            // Drain everything due before sleeping again.
            match self.run_next().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("{} worker {}: error claiming job: {}", self.pool, self.index, e),
            }

            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = notifier.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!("{} worker {} shutting down", self.pool, self.index);
    }

    /// Claim and execute one job. `Ok(false)` when nothing was due.
    async fn run_next(&self) -> Result<bool> {
        let Ok(_permit) = self.semaphore.clone().try_acquire_owned() else {
            return Ok(false);
        };

        let Some(job) = self.job_queue.claim_next(self.handler.kinds()).await? else {
            return Ok(false);
        };

        self.active_workers.fetch_add(1, Ordering::SeqCst);
        debug!(
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempts,
            "{} worker {} processing job",
            self.pool,
            self.index
        );

        let result = tokio::time::timeout(self.job_timeout, self.handler.handle(&job)).await;
        let outcome = match result {
            Ok(Ok(())) => self.job_queue.complete(&job.id).await,
            Ok(Err(e)) => self
                .job_queue
                .fail(&job, &e.to_string())
                .await
                .map(|_| ()),
            Err(_) => self
                .job_queue
                .fail(&job, "Job timed out")
                .await
                .map(|_| ()),
        };
        self.active_workers.fetch_sub(1, Ordering::SeqCst);

        if let Err(e) = outcome {
            error!(job_id = %job.id, "Failed to record job outcome: {}", e);
        }
        Ok(true)
    }
}
