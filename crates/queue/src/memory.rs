//! In-process queue backend: development and tests, single node only.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    QueueBackend,
    error::QueueError,
    job::{JobOptions, JobRecord, JobState, QueueMetrics},
};

struct StoredJob {
    record: JobRecord,
    delay_until: Option<DateTime<Utc>>,
}

struct Inner {
    jobs: HashMap<String, StoredJob>,
    next_id: u64,
}

pub struct MemoryQueue {
    options: JobOptions,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new(options: JobOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn promote_due(inner: &mut Inner, now: DateTime<Utc>) {
        for stored in inner.jobs.values_mut() {
            if stored.record.state == JobState::Delayed
                && stored.delay_until.is_none_or(|until| until <= now)
            {
                stored.record.state = JobState::Waiting;
                stored.delay_until = None;
            }
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(JobOptions::default())
    }
}

impl MemoryQueue {
    fn insert_job(&self, data: serde_json::Value, delay: Option<Duration>) -> String {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id.to_string();
        let delay_until = delay.map(|d| {
            Utc::now() + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
        });
        inner.jobs.insert(id.clone(), StoredJob {
            record: JobRecord {
                id: id.clone(),
                data,
                state: if delay_until.is_some() {
                    JobState::Delayed
                } else {
                    JobState::Waiting
                },
                attempts_made: 0,
                max_attempts: self.options.attempts,
                progress: 0,
                created_at: Utc::now(),
                processed_on: None,
                finished_on: None,
                failed_reason: None,
            },
            delay_until,
        });
        id
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn add(&self, data: serde_json::Value) -> Result<String, QueueError> {
        Ok(self.insert_job(data, None))
    }

    async fn add_delayed(
        &self,
        data: serde_json::Value,
        delay: Duration,
    ) -> Result<String, QueueError> {
        Ok(self.insert_job(data, Some(delay)))
    }

    async fn reserve(&self) -> Result<Option<JobRecord>, QueueError> {
        let mut inner = self.lock();
        let now = Utc::now();
        Self::promote_due(&mut inner, now);

        // Oldest waiting job first: ids are monotonic.
        let next_id = inner
            .jobs
            .values()
            .filter(|s| s.record.state == JobState::Waiting)
            .min_by_key(|s| s.record.id.parse::<u64>().unwrap_or(u64::MAX))
            .map(|s| s.record.id.clone());

        let Some(id) = next_id else { return Ok(None) };
        let Some(stored) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        stored.record.state = JobState::Active;
        stored.record.attempts_made += 1;
        stored.record.processed_on = Some(now);
        Ok(Some(stored.record.clone()))
    }

    async fn complete(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if self.options.remove_on_complete {
            inner
                .jobs
                .remove(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            return Ok(());
        }
        let stored = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        stored.record.state = JobState::Completed;
        stored.record.progress = 100;
        stored.record.finished_on = Some(Utc::now());
        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        reason: &str,
        retry_in: Option<Duration>,
    ) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let stored = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        stored.record.failed_reason = Some(reason.to_string());
        match retry_in {
            Some(delay) => {
                stored.record.state = JobState::Delayed;
                stored.delay_until = Some(
                    Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(2)),
                );
            },
            None => {
                stored.record.state = JobState::Failed;
                stored.record.finished_on = Some(Utc::now());
            },
        }
        Ok(())
    }

    async fn retry(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let stored = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if stored.record.state != JobState::Failed {
            return Err(QueueError::WrongState {
                id: id.to_string(),
                state: stored.record.state.as_str(),
                expected: "failed",
            });
        }
        stored.record.state = JobState::Waiting;
        stored.record.attempts_made = 0;
        stored.record.failed_reason = None;
        stored.record.finished_on = None;
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.lock().jobs.get(id).map(|s| s.record.clone()))
    }

    async fn update_progress(&self, id: &str, progress: u8) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if let Some(stored) = inner.jobs.get_mut(id) {
            stored.record.progress = progress.min(100);
        }
        Ok(())
    }

    async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
        let inner = self.lock();
        let mut metrics = QueueMetrics::default();
        for stored in inner.jobs.values() {
            match stored.record.state {
                JobState::Waiting => metrics.waiting += 1,
                JobState::Active => metrics.active += 1,
                JobState::Delayed => metrics.delayed += 1,
                JobState::Completed => metrics.completed += 1,
                JobState::Failed => metrics.failed += 1,
            }
        }
        metrics.total =
            metrics.waiting + metrics.active + metrics.delayed + metrics.completed + metrics.failed;
        Ok(metrics)
    }

    async fn clean(&self, state: JobState) -> Result<u64, QueueError> {
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, s| s.record.state != state);
        Ok((before - inner.jobs.len()) as u64)
    }

    async fn stalled(&self, threshold: Duration) -> Result<Vec<String>, QueueError> {
        let inner = self.lock();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::seconds(60));
        Ok(inner
            .jobs
            .values()
            .filter(|s| {
                s.record.state == JobState::Active
                    && s.record.processed_on.is_some_and(|at| at <= cutoff)
            })
            .map(|s| s.record.id.clone())
            .collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn keep_all() -> JobOptions {
        JobOptions {
            remove_on_complete: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_fifo() {
        let queue = MemoryQueue::default();
        let a = queue.add(serde_json::json!({"n": 1})).await.unwrap();
        let b = queue.add(serde_json::json!({"n": 2})).await.unwrap();
        assert!(a.parse::<u64>().unwrap() < b.parse::<u64>().unwrap());

        let first = queue.reserve().await.unwrap().unwrap();
        assert_eq!(first.id, a);
        assert_eq!(first.state, JobState::Active);
        assert_eq!(first.attempts_made, 1);
    }

    #[tokio::test]
    async fn complete_removes_by_default() {
        let queue = MemoryQueue::default();
        let id = queue.add(serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();
        queue.complete(&id).await.unwrap();
        assert!(queue.status(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_jobs_persist_for_inspection() {
        let queue = MemoryQueue::default();
        let id = queue.add(serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();
        queue.fail(&id, "provider exploded", None).await.unwrap();

        let record = queue.status(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.failed_reason.as_deref(), Some("provider exploded"));
    }

    #[tokio::test]
    async fn delayed_jobs_promote_after_backoff() {
        let queue = MemoryQueue::default();
        let id = queue.add(serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();
        queue
            .fail(&id, "transient", Some(Duration::from_millis(30)))
            .await
            .unwrap();

        assert!(queue.reserve().await.unwrap().is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let retried = queue.reserve().await.unwrap().unwrap();
        assert_eq!(retried.id, id);
        assert_eq!(retried.attempts_made, 2);
    }

    #[tokio::test]
    async fn scheduled_jobs_start_delayed() {
        let queue = MemoryQueue::default();
        let id = queue
            .add_delayed(serde_json::json!({}), Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(
            queue.status(&id).await.unwrap().unwrap().state,
            JobState::Delayed
        );
        assert!(queue.reserve().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn retry_only_from_failed_and_resets_attempts() {
        let queue = MemoryQueue::new(keep_all());
        let id = queue.add(serde_json::json!({})).await.unwrap();

        let err = queue.retry(&id).await.unwrap_err();
        assert!(matches!(err, QueueError::WrongState { .. }));

        queue.reserve().await.unwrap().unwrap();
        queue.fail(&id, "boom", None).await.unwrap();
        queue.retry(&id).await.unwrap();

        let record = queue.status(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.attempts_made, 0);
        assert!(record.failed_reason.is_none());
    }

    #[tokio::test]
    async fn metrics_count_each_state() {
        let queue = MemoryQueue::new(keep_all());
        let a = queue.add(serde_json::json!({})).await.unwrap();
        queue.add(serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();
        queue.complete(&a).await.unwrap();

        let metrics = queue.metrics().await.unwrap();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.waiting, 1);
        assert_eq!(metrics.total, 2);
    }

    #[tokio::test]
    async fn clean_failed_jobs() {
        let queue = MemoryQueue::default();
        let id = queue.add(serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();
        queue.fail(&id, "boom", None).await.unwrap();

        assert_eq!(queue.clean(JobState::Failed).await.unwrap(), 1);
        assert!(queue.status(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stall_detection_by_age() {
        let queue = MemoryQueue::default();
        let id = queue.add(serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();

        assert!(queue.stalled(Duration::from_secs(60)).await.unwrap().is_empty());
        let stalled = queue.stalled(Duration::ZERO).await.unwrap();
        assert_eq!(stalled, vec![id]);
    }
}
