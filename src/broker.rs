// src/broker.rs
use async_trait::async_trait;
use redis::{AsyncCommands, Direction, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compute::is_safe_job_id;
use crate::constants::{PREFIX_DEAD, PREFIX_PROCESSING, PREFIX_QUEUE, QUEUES_SET_KEY};
use crate::error::{BrokerError, MessageError};
use crate::rdconfig::get_redis_conn;

/// Wire envelope published once per newly-created job. The schema is fixed;
/// anything that does not parse into it is poison at the queue boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: String,
    pub payload: String,
}

impl JobMessage {
    pub fn new(job_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { job_id: job_id.into(), payload: payload.into() }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let msg: JobMessage = serde_json::from_str(raw)?;
        if msg.job_id.trim().is_empty() {
            return Err(MessageError::MissingJobId);
        }
        // the id becomes part of filesystem paths downstream; anything that
        // is not a plain hex-ish digest is poison at this boundary
        if !is_safe_job_id(&msg.job_id) {
            return Err(MessageError::UnsafeJobId(msg.job_id));
        }
        if msg.payload.trim().is_empty() {
            return Err(MessageError::EmptyPayload(msg.job_id));
        }
        Ok(msg)
    }
}

/// Broker confirmation outcome. `Rejected` means the broker answered but
/// would not take the message; transport failures are a [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Rejected,
}

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, message: &JobMessage) -> Result<PublishOutcome, BrokerError>;
}

/// Durable named queue on a Redis list. Publishing is a synchronous
/// durability checkpoint: the LPUSH integer reply is the confirmation.
pub struct RedisQueue {
    redis_url: String,
    queue: String,
}

impl RedisQueue {
    pub fn new(redis_url: impl Into<String>, queue: impl Into<String>) -> Self {
        Self { redis_url: redis_url.into(), queue: queue.into() }
    }

    fn queue_key(&self) -> String {
        format!("{PREFIX_QUEUE}:{}", self.queue)
    }
}

#[async_trait]
impl QueuePublisher for RedisQueue {
    async fn publish(&self, message: &JobMessage) -> Result<PublishOutcome, BrokerError> {
        let body = message.encode().map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        // Connection is scoped to this publish and dropped on every path.
        let mut conn = get_redis_conn(&self.redis_url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        // Declare the queue (idempotent): register its name for operators.
        conn.sadd::<_, _, ()>(QUEUES_SET_KEY, &self.queue)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        match conn.lpush::<_, _, usize>(self.queue_key(), &body).await {
            Ok(depth) => {
                debug!(job_id = %message.job_id, queue = %self.queue, depth, "publish confirmed");
                Ok(PublishOutcome::Accepted)
            }
            // The queue key exists but is not routable as a list.
            Err(e) if e.kind() == ErrorKind::TypeError => Ok(PublishOutcome::Rejected),
            Err(e) => Err(BrokerError::Unavailable(e.to_string())),
        }
    }
}

/// An in-flight delivery. `raw` is kept verbatim so ack/discard can remove
/// exactly the entry that was moved into the processing list.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub raw: String,
}

/// Consumer side of the queue: BLMOVE each message into a per-consumer
/// processing list (prefetch of one unacknowledged message), then `ack` or
/// `discard` it. Unacked entries survive a crash in the processing list and
/// are requeued by `recover`, which is what makes delivery at-least-once.
pub struct RedisConsumer {
    redis_url: String,
    queue: String,
    consumer_tag: String,
}

impl RedisConsumer {
    pub fn new(
        redis_url: impl Into<String>,
        queue: impl Into<String>,
        consumer_tag: impl Into<String>,
    ) -> Self {
        Self {
            redis_url: redis_url.into(),
            queue: queue.into(),
            consumer_tag: consumer_tag.into(),
        }
    }

    fn queue_key(&self) -> String {
        format!("{PREFIX_QUEUE}:{}", self.queue)
    }

    fn processing_key(&self) -> String {
        format!("{PREFIX_PROCESSING}:{}:{}", self.queue, self.consumer_tag)
    }

    fn dead_key(&self) -> String {
        format!("{PREFIX_DEAD}:{}", self.queue)
    }

    /// Requeue entries a previous incarnation of this consumer left
    /// unacknowledged. Called once on startup, before consuming.
    pub async fn recover(&self) -> Result<usize, BrokerError> {
        let mut conn = get_redis_conn(&self.redis_url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let mut recovered = 0usize;
        loop {
            let moved: Option<String> = conn
                .lmove(self.processing_key(), self.queue_key(), Direction::Left, Direction::Right)
                .await
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            match moved {
                Some(_) => recovered += 1,
                None => break,
            }
        }
        if recovered > 0 {
            info!(queue = %self.queue, recovered, "requeued unacknowledged deliveries");
        }
        Ok(recovered)
    }

    /// Block until the next message arrives (or the timeout passes), moving
    /// it into the processing list so it survives a worker crash.
    pub async fn next(&self, timeout_secs: f64) -> Result<Option<Delivery>, BrokerError> {
        let mut conn = get_redis_conn(&self.redis_url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let raw: Option<String> = conn
            .blmove(
                self.queue_key(),
                self.processing_key(),
                Direction::Right,
                Direction::Left,
                timeout_secs,
            )
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(raw.map(|raw| Delivery { raw }))
    }

    /// Positive acknowledgment: the message is removed from the queue for
    /// good.
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut conn = get_redis_conn(&self.redis_url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        conn.lrem::<_, _, ()>(self.processing_key(), 1, &delivery.raw)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// Negative acknowledgment without requeue: the message is parked on the
    /// dead list instead of looping back for another attempt.
    pub async fn discard(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut conn = get_redis_conn(&self.redis_url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        redis::pipe()
            .lrem(self.processing_key(), 1, &delivery.raw)
            .ignore()
            .rpush(self.dead_key(), &delivery.raw)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
