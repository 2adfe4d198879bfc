//! Redis-backed queue: per-job hashes plus state lists, with delayed jobs
//! parked in a sorted set scored by their ready time.

use std::time::Duration;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    redis::{AsyncCommands, Direction, aio::ConnectionManager},
    tracing::debug,
};

use crate::{
    QueueBackend,
    error::QueueError,
    job::{JobOptions, JobRecord, JobState, QueueMetrics},
};

const DEFAULT_PREFIX: &str = "gridkit:queue";

pub struct RedisQueue {
    manager: ConnectionManager,
    options: JobOptions,
    prefix: String,
}

fn backend(e: redis::RedisError) -> QueueError {
    QueueError::Backend(e.to_string())
}

impl RedisQueue {
    /// Connect to `redis_url` with the default key prefix.
    pub async fn connect(redis_url: &str, options: JobOptions) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(backend)?;
        let manager = client.get_connection_manager().await.map_err(backend)?;
        Ok(Self {
            manager,
            options,
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.prefix)
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{id}", self.prefix)
    }

    fn con(&self) -> ConnectionManager {
        self.manager.clone()
    }

    async fn read_job(&self, id: &str) -> Result<Option<JobRecord>, QueueError> {
        let mut con = self.con();
        let fields: std::collections::HashMap<String, String> =
            con.hgetall(self.job_key(id)).await.map_err(backend)?;
        if fields.is_empty() {
            return Ok(None);
        }

        let parse_ts = |name: &str| -> Option<DateTime<Utc>> {
            fields
                .get(name)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        Ok(Some(JobRecord {
            id: id.to_string(),
            data: fields
                .get("data")
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(serde_json::Value::Null),
            state: fields
                .get("state")
                .and_then(|raw| JobState::parse(raw))
                .unwrap_or(JobState::Waiting),
            attempts_made: fields
                .get("attempts_made")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0),
            max_attempts: fields
                .get("max_attempts")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(self.options.attempts),
            progress: fields
                .get("progress")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0),
            created_at: parse_ts("created_at").unwrap_or_else(Utc::now),
            processed_on: parse_ts("processed_on"),
            finished_on: parse_ts("finished_on"),
            failed_reason: fields.get("failed_reason").cloned(),
        }))
    }

    /// Move due delayed jobs back to waiting.
    async fn promote_due(&self) -> Result<(), QueueError> {
        let mut con = self.con();
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = con
            .zrangebyscore(self.key("delayed"), 0i64, now_ms)
            .await
            .map_err(backend)?;
        for id in due {
            let _: () = con
                .zrem(self.key("delayed"), &id)
                .await
                .map_err(backend)?;
            let _: () = con
                .hset(self.job_key(&id), "state", JobState::Waiting.as_str())
                .await
                .map_err(backend)?;
            let _: () = con
                .rpush(self.key("waiting"), &id)
                .await
                .map_err(backend)?;
            debug!(job_id = %id, "delayed job promoted");
        }
        Ok(())
    }
}

impl RedisQueue {
    async fn insert_job(
        &self,
        data: serde_json::Value,
        delay: Option<Duration>,
    ) -> Result<String, QueueError> {
        let mut con = self.con();
        let id: u64 = con.incr(self.key("id"), 1u64).await.map_err(backend)?;
        let id = id.to_string();

        let state = if delay.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        let _: () = con
            .hset_multiple(self.job_key(&id), &[
                ("data", serde_json::to_string(&data)?),
                ("state", state.as_str().to_string()),
                ("attempts_made", "0".to_string()),
                ("max_attempts", self.options.attempts.to_string()),
                ("progress", "0".to_string()),
                ("created_at", Utc::now().to_rfc3339()),
            ])
            .await
            .map_err(backend)?;

        match delay {
            Some(delay) => {
                let ready_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                let _: () = con
                    .zadd(self.key("delayed"), &id, ready_ms)
                    .await
                    .map_err(backend)?;
            },
            None => {
                let _: () = con
                    .rpush(self.key("waiting"), &id)
                    .await
                    .map_err(backend)?;
            },
        }
        Ok(id)
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn add(&self, data: serde_json::Value) -> Result<String, QueueError> {
        self.insert_job(data, None).await
    }

    async fn add_delayed(
        &self,
        data: serde_json::Value,
        delay: Duration,
    ) -> Result<String, QueueError> {
        self.insert_job(data, Some(delay)).await
    }

    async fn reserve(&self) -> Result<Option<JobRecord>, QueueError> {
        self.promote_due().await?;

        let mut con = self.con();
        let id: Option<String> = con
            .lmove(
                self.key("waiting"),
                self.key("active"),
                Direction::Left,
                Direction::Right,
            )
            .await
            .map_err(backend)?;
        let Some(id) = id else { return Ok(None) };

        let _: () = con
            .hincr(self.job_key(&id), "attempts_made", 1u32)
            .await
            .map_err(backend)?;
        let _: () = con
            .hset_multiple(self.job_key(&id), &[
                ("state", JobState::Active.as_str().to_string()),
                ("processed_on", Utc::now().to_rfc3339()),
            ])
            .await
            .map_err(backend)?;

        self.read_job(&id).await
    }

    async fn complete(&self, id: &str) -> Result<(), QueueError> {
        let mut con = self.con();
        let _: () = con
            .lrem(self.key("active"), 1, id)
            .await
            .map_err(backend)?;

        if self.options.remove_on_complete {
            let _: () = con.del(self.job_key(id)).await.map_err(backend)?;
            return Ok(());
        }
        let _: () = con
            .hset_multiple(self.job_key(id), &[
                ("state", JobState::Completed.as_str().to_string()),
                ("progress", "100".to_string()),
                ("finished_on", Utc::now().to_rfc3339()),
            ])
            .await
            .map_err(backend)?;
        let _: () = con
            .rpush(self.key("completed"), id)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        reason: &str,
        retry_in: Option<Duration>,
    ) -> Result<(), QueueError> {
        let mut con = self.con();
        let _: () = con
            .lrem(self.key("active"), 1, id)
            .await
            .map_err(backend)?;
        let _: () = con
            .hset(self.job_key(id), "failed_reason", reason)
            .await
            .map_err(backend)?;

        match retry_in {
            Some(delay) => {
                let ready_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                let _: () = con
                    .hset(self.job_key(id), "state", JobState::Delayed.as_str())
                    .await
                    .map_err(backend)?;
                let _: () = con
                    .zadd(self.key("delayed"), id, ready_ms)
                    .await
                    .map_err(backend)?;
            },
            None => {
                let _: () = con
                    .hset_multiple(self.job_key(id), &[
                        ("state", JobState::Failed.as_str().to_string()),
                        ("finished_on", Utc::now().to_rfc3339()),
                    ])
                    .await
                    .map_err(backend)?;
                if self.options.remove_on_fail {
                    let _: () = con.del(self.job_key(id)).await.map_err(backend)?;
                } else {
                    let _: () = con
                        .rpush(self.key("failed"), id)
                        .await
                        .map_err(backend)?;
                }
            },
        }
        Ok(())
    }

    async fn retry(&self, id: &str) -> Result<(), QueueError> {
        let record = self
            .read_job(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if record.state != JobState::Failed {
            return Err(QueueError::WrongState {
                id: id.to_string(),
                state: record.state.as_str(),
                expected: "failed",
            });
        }

        let mut con = self.con();
        let _: () = con
            .lrem(self.key("failed"), 1, id)
            .await
            .map_err(backend)?;
        let _: () = con
            .hset_multiple(self.job_key(id), &[
                ("state", JobState::Waiting.as_str().to_string()),
                ("attempts_made", "0".to_string()),
            ])
            .await
            .map_err(backend)?;
        let _: () = con
            .hdel(self.job_key(id), &["failed_reason", "finished_on"])
            .await
            .map_err(backend)?;
        let _: () = con
            .rpush(self.key("waiting"), id)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<Option<JobRecord>, QueueError> {
        self.read_job(id).await
    }

    async fn update_progress(&self, id: &str, progress: u8) -> Result<(), QueueError> {
        let mut con = self.con();
        let _: () = con
            .hset(self.job_key(id), "progress", progress.min(100))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
        let mut con = self.con();
        let waiting: u64 = con.llen(self.key("waiting")).await.map_err(backend)?;
        let active: u64 = con.llen(self.key("active")).await.map_err(backend)?;
        let delayed: u64 = con.zcard(self.key("delayed")).await.map_err(backend)?;
        let completed: u64 = con.llen(self.key("completed")).await.map_err(backend)?;
        let failed: u64 = con.llen(self.key("failed")).await.map_err(backend)?;
        Ok(QueueMetrics {
            waiting,
            active,
            delayed,
            completed,
            failed,
            paused: 0,
            total: waiting + active + delayed + completed + failed,
        })
    }

    async fn clean(&self, state: JobState) -> Result<u64, QueueError> {
        let list = match state {
            JobState::Completed => self.key("completed"),
            JobState::Failed => self.key("failed"),
            _ => return Ok(0),
        };
        let mut con = self.con();
        let ids: Vec<String> = con.lrange(&list, 0, -1).await.map_err(backend)?;
        for id in &ids {
            let _: () = con.del(self.job_key(id)).await.map_err(backend)?;
        }
        let _: () = con.del(&list).await.map_err(backend)?;
        Ok(ids.len() as u64)
    }

    async fn stalled(&self, threshold: Duration) -> Result<Vec<String>, QueueError> {
        let mut con = self.con();
        let ids: Vec<String> = con
            .lrange(self.key("active"), 0, -1)
            .await
            .map_err(backend)?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut stalled = Vec::new();
        for id in ids {
            let processed_on: Option<String> = con
                .hget(self.job_key(&id), "processed_on")
                .await
                .map_err(backend)?;
            let started = processed_on
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|dt| dt.with_timezone(&Utc));
            if started.is_some_and(|at| at <= cutoff) {
                stalled.push(id);
            }
        }
        Ok(stalled)
    }
}
