//! Durable message-dispatch queue: backend contract, in-memory and
//! Redis-backed implementations, and the worker pool that drains it.
//!
//! Semantics follow the list-based protocol: every job is in exactly one
//! of {waiting, active, delayed, completed, failed}; moves between states
//! are atomic from the caller's point of view; failed jobs persist for
//! inspection while completed jobs are dropped.

pub mod error;
pub mod job;
pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod worker;

use async_trait::async_trait;

pub use {
    error::QueueError,
    job::{JobOptions, JobRecord, JobState, QueueMetrics, backoff_delay},
    memory::MemoryQueue,
    worker::{JobError, JobHandler, WorkerPool},
};

#[cfg(feature = "redis-store")]
pub use redis_store::RedisQueue;

/// Durable queue backend. One logical queue per process.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a job; returns its monotonic id.
    async fn add(&self, data: serde_json::Value) -> Result<String, QueueError>;

    /// Enqueue a job that becomes ready after `delay` (scheduled sends).
    async fn add_delayed(
        &self,
        data: serde_json::Value,
        delay: std::time::Duration,
    ) -> Result<String, QueueError>;

    /// Promote due delayed jobs, then move the oldest waiting job to
    /// active and return it. `None` when nothing is ready.
    async fn reserve(&self) -> Result<Option<JobRecord>, QueueError>;

    async fn complete(&self, id: &str) -> Result<(), QueueError>;

    /// Fail the active job: with `retry_in` it parks in delayed for
    /// re-dispatch, without it the job is terminally failed.
    async fn fail(
        &self,
        id: &str,
        reason: &str,
        retry_in: Option<std::time::Duration>,
    ) -> Result<(), QueueError>;

    /// Re-enqueue a terminally failed job, visibly resetting its attempt
    /// counter. Only legal from the failed state.
    async fn retry(&self, id: &str) -> Result<(), QueueError>;

    async fn status(&self, id: &str) -> Result<Option<JobRecord>, QueueError>;

    async fn update_progress(&self, id: &str, progress: u8) -> Result<(), QueueError>;

    async fn metrics(&self) -> Result<QueueMetrics, QueueError>;

    /// Bulk-remove completed or failed jobs; returns how many went.
    async fn clean(&self, state: JobState) -> Result<u64, QueueError>;

    /// Ids of jobs active for longer than `threshold`.
    async fn stalled(&self, threshold: std::time::Duration) -> Result<Vec<String>, QueueError>;
}
