//! Worker pool: drains the queue, applies the retry policy, detects
//! stalls, and drains gracefully on shutdown.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::task::JoinSet,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{
    QueueBackend,
    job::{JobOptions, JobRecord, backoff_delay},
};

/// Outcome of one job attempt, as reported by the handler.
#[derive(Debug)]
pub struct JobError {
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<gridkit_common::Error> for JobError {
    fn from(err: gridkit_common::Error) -> Self {
        Self {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &JobRecord) -> Result<(), JobError>;
}

/// Pool configuration. Defaults match the queue contract: 60 s stall
/// threshold, 30 s shutdown grace.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub stall_threshold: Duration,
    pub stall_check_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(250),
            stall_threshold: Duration::from_secs(60),
            stall_check_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn QueueBackend>,
    handler: Arc<dyn JobHandler>,
    options: JobOptions,
    config: WorkerConfig,
    shutdown: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueBackend>,
        handler: Arc<dyn JobHandler>,
        options: JobOptions,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            options,
            config,
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    /// Spawn the worker loops and the stall monitor.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        for worker_id in 0..self.config.concurrency {
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let options = self.options;
            let poll = self.config.poll_interval;
            let token = self.shutdown.clone();
            let in_flight = Arc::clone(&self.in_flight);
            tasks.spawn(async move {
                worker_loop(worker_id, queue, handler, options, poll, token, in_flight).await;
            });
        }

        let queue = Arc::clone(&self.queue);
        let token = self.shutdown.clone();
        let threshold = self.config.stall_threshold;
        let interval = self.config.stall_check_interval;
        tasks.spawn(async move {
            stall_monitor(queue, threshold, interval, token).await;
        });

        info!(concurrency = self.config.concurrency, "worker pool started");
    }

    /// Stop reserving, drain in-flight jobs within the grace period, then
    /// fail anything still active with reason `shutdown`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        while self.in_flight.load(Ordering::Acquire) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("shutdown grace elapsed with jobs still in flight");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut tasks = self.tasks.lock().await;
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        match self.queue.stalled(Duration::ZERO).await {
            Ok(active) => {
                for id in active {
                    if let Err(err) = self.queue.fail(&id, "shutdown", None).await {
                        error!(job_id = %id, error = %err, "failed to mark job during shutdown");
                    }
                }
            },
            Err(err) => error!(error = %err, "could not enumerate active jobs during shutdown"),
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn QueueBackend>,
    handler: Arc<dyn JobHandler>,
    options: JobOptions,
    poll: Duration,
    token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
) {
    loop {
        if token.is_cancelled() {
            return;
        }

        let job = match queue.reserve().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(poll) => continue,
                }
            },
            Err(err) => {
                error!(worker_id, error = %err, "queue reserve failed");
                tokio::time::sleep(poll).await;
                continue;
            },
        };

        in_flight.fetch_add(1, Ordering::AcqRel);
        process_job(&queue, &handler, &options, &job).await;
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn process_job(
    queue: &Arc<dyn QueueBackend>,
    handler: &Arc<dyn JobHandler>,
    options: &JobOptions,
    job: &JobRecord,
) {
    info!(job_id = %job.id, attempt = job.attempts_made, "job dispatch started");
    match handler.handle(job).await {
        Ok(()) => {
            let _ = queue.update_progress(&job.id, 100).await;
            if let Err(err) = queue.complete(&job.id).await {
                error!(job_id = %job.id, error = %err, "failed to complete job");
            } else {
                info!(job_id = %job.id, "job completed");
            }
        },
        Err(job_err) if job_err.retryable && job.attempts_made < job.max_attempts => {
            let delay = backoff_delay(options.backoff_base, job.attempts_made);
            warn!(
                job_id = %job.id,
                attempt = job.attempts_made,
                retry_in_ms = delay.as_millis() as u64,
                reason = %job_err.message,
                "job attempt failed, backing off"
            );
            if let Err(err) = queue.fail(&job.id, &job_err.message, Some(delay)).await {
                error!(job_id = %job.id, error = %err, "failed to park job for retry");
            }
        },
        Err(job_err) => {
            warn!(
                job_id = %job.id,
                attempt = job.attempts_made,
                reason = %job_err.message,
                "job terminally failed"
            );
            if let Err(err) = queue.fail(&job.id, &job_err.message, None).await {
                error!(job_id = %job.id, error = %err, "failed to mark job failed");
            }
        },
    }
}

/// Stalled jobs are logged, not requeued; requeueing is an operator
/// decision made through the retry endpoint.
async fn stall_monitor(
    queue: Arc<dyn QueueBackend>,
    threshold: Duration,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(interval) => {},
        }
        match queue.stalled(threshold).await {
            Ok(ids) => {
                for id in ids {
                    warn!(job_id = %id, threshold_s = threshold.as_secs(), "job appears stalled");
                }
            },
            Err(err) => error!(error = %err, "stall scan failed"),
        }
    }
}
