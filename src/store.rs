// src/store.rs
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::PREFIX_JOB;
use crate::error::StoreError;
use crate::status::JobStatus;

/// Persisted view of a job. The store is the sole owner of this state;
/// everybody else reads it or requests transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Presence is an outcome, not an error: callers branch on it exhaustively.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Found(JobRecord),
    NotFound,
}

/// Typed contract against the job-status store. `create` is the single
/// linearization point for concurrent submissions of identical content;
/// `transition` serializes per-key and enforces the state machine.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(
        &self,
        job_id: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<JobRecord, StoreError>;

    async fn get(&self, job_id: &str) -> Result<GetOutcome, StoreError>;

    /// Request a status transition. `completed_at` is accepted only for
    /// terminal targets; a terminal transition without one is stamped with
    /// the store's clock.
    async fn transition(
        &self,
        job_id: &str,
        target: JobStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<JobRecord, StoreError>;
}

fn job_key(job_id: &str) -> String {
    format!("{PREFIX_JOB}:{job_id}")
}

fn resolve_completed_at(
    target: JobStatus,
    completed_at: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    if target.is_terminal() {
        Ok(Some(completed_at.unwrap_or_else(Utc::now)))
    } else if completed_at.is_some() {
        Err(StoreError::InvalidTimestamp(target))
    } else {
        Ok(None)
    }
}

// Atomic create-if-absent; the EXISTS/HSET pair runs as one script so the
// existence check cannot race a concurrent create of the same id.
static CREATE_JOB: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return 'EXISTS'
        end
        redis.call('HSET', KEYS[1], 'status', ARGV[1], 'submitted_at', ARGV[2])
        return 'OK'
        "#,
    )
});

// Guarded transition; the legality table mirrors JobStatus::can_transition.
static TRANSITION_JOB: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local cur = redis.call('HGET', KEYS[1], 'status')
        if not cur then
            return 'MISSING'
        end
        local ok = (cur == 'QUEUED' and (ARGV[1] == 'RUNNING' or ARGV[1] == 'FAILED'))
            or (cur == 'RUNNING' and (ARGV[1] == 'FINISHED' or ARGV[1] == 'FAILED'))
        if not ok then
            return 'ILLEGAL:' .. cur
        end
        if ARGV[2] == '' then
            redis.call('HSET', KEYS[1], 'status', ARGV[1])
        else
            redis.call('HSET', KEYS[1], 'status', ARGV[1], 'completed_at', ARGV[2])
        end
        return 'OK'
        "#,
    )
});

/// Production store: one Redis hash per job under `sq:job:{id}`.
pub struct RedisJobStore {
    redis_url: String,
}

impl RedisJobStore {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self { redis_url: redis_url.into() }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        crate::rdconfig::get_redis_conn(&self.redis_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn read_record(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &str,
    ) -> Result<Option<JobRecord>, StoreError> {
        let map: HashMap<String, String> = conn
            .hgetall(job_key(job_id))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_record(job_id, &map)?))
    }
}

fn decode_record(job_id: &str, map: &HashMap<String, String>) -> Result<JobRecord, StoreError> {
    let status = map
        .get("status")
        .ok_or_else(|| StoreError::Unavailable(format!("job {job_id} hash has no status")))?
        .parse::<JobStatus>()
        .map_err(StoreError::Unavailable)?;
    let submitted_at = map
        .get("submitted_at")
        .ok_or_else(|| StoreError::Unavailable(format!("job {job_id} hash has no submitted_at")))?
        .parse::<DateTime<Utc>>()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let completed_at = map
        .get("completed_at")
        .map(|raw| raw.parse::<DateTime<Utc>>())
        .transpose()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(JobRecord {
        job_id: job_id.to_string(),
        status,
        submitted_at,
        completed_at,
    })
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(
        &self,
        job_id: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<JobRecord, StoreError> {
        let mut conn = self.conn().await?;
        let reply: String = CREATE_JOB
            .key(job_key(job_id))
            .arg(JobStatus::Queued.as_str())
            .arg(submitted_at.to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        match reply.as_str() {
            "OK" => {
                debug!(job_id, "job record created");
                Ok(JobRecord {
                    job_id: job_id.to_string(),
                    status: JobStatus::Queued,
                    submitted_at,
                    completed_at: None,
                })
            }
            _ => Err(StoreError::AlreadyExists(job_id.to_string())),
        }
    }

    async fn get(&self, job_id: &str) -> Result<GetOutcome, StoreError> {
        let mut conn = self.conn().await?;
        match self.read_record(&mut conn, job_id).await? {
            Some(record) => Ok(GetOutcome::Found(record)),
            None => Ok(GetOutcome::NotFound),
        }
    }

    async fn transition(
        &self,
        job_id: &str,
        target: JobStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<JobRecord, StoreError> {
        let completed_at = resolve_completed_at(target, completed_at)?;
        let mut conn = self.conn().await?;
        let stamp = completed_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let reply: String = TRANSITION_JOB
            .key(job_key(job_id))
            .arg(target.as_str())
            .arg(stamp)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        match reply.as_str() {
            "OK" => {
                debug!(job_id, %target, "job transitioned");
                self.read_record(&mut conn, job_id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
            }
            "MISSING" => Err(StoreError::NotFound(job_id.to_string())),
            other => {
                let from = other
                    .strip_prefix("ILLEGAL:")
                    .and_then(|s| s.parse::<JobStatus>().ok())
                    .ok_or_else(|| {
                        StoreError::Unavailable(format!("unexpected transition reply '{other}'"))
                    })?;
                Err(StoreError::IllegalTransition { from, to: target })
            }
        }
    }
}

/// In-process store sharing the same contract; used by tests and local
/// development without a Redis instance.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(
        &self,
        job_id: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        if jobs.contains_key(job_id) {
            return Err(StoreError::AlreadyExists(job_id.to_string()));
        }
        let record = JobRecord {
            job_id: job_id.to_string(),
            status: JobStatus::Queued,
            submitted_at,
            completed_at: None,
        };
        jobs.insert(job_id.to_string(), record.clone());
        Ok(record)
    }

    async fn get(&self, job_id: &str) -> Result<GetOutcome, StoreError> {
        let jobs = self.jobs.lock().expect("job map poisoned");
        Ok(match jobs.get(job_id) {
            Some(record) => GetOutcome::Found(record.clone()),
            None => GetOutcome::NotFound,
        })
    }

    async fn transition(
        &self,
        job_id: &str,
        target: JobStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<JobRecord, StoreError> {
        let completed_at = resolve_completed_at(target, completed_at)?;
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        if !record.status.can_transition(target) {
            return Err(StoreError::IllegalTransition { from: record.status, to: target });
        }
        record.status = target;
        if let Some(stamp) = completed_at {
            record.completed_at = Some(stamp);
        }
        Ok(record.clone())
    }
}
