//! Fast queue: an ephemeral redis list of job ids.
//!
//! Entries are wake-up hints for the scheduler's drain loop, nothing
//! more. The list may be lost (redis restart) without losing work;
//! recovery re-derives entries from the durable store. Pops are atomic,
//! so a given entry reaches exactly one consumer.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// Default redis key for the acquisition job list.
const QUEUE_KEY: &str = "damwatch:acquisition:queue";

/// FIFO list of pending acquisition job ids.
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
    key: String,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("key", &self.key)
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl JobQueue {
    /// Connect to redis at the given URL.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        info!("Connecting to redis fast queue at {redis_url}");

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            key: QUEUE_KEY.to_string(),
        })
    }

    /// Use a custom list key (isolated keys for tests).
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Append a job id to the back of the queue.
    pub async fn push_back(&self, id: Uuid) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.key, id.to_string()).await
    }

    /// Return a job id to the front of the queue, preserving its place
    /// in line. Used when the worker pool has no free slot.
    pub async fn push_front(&self, id: Uuid) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.key, id.to_string()).await
    }

    /// Pop the oldest entry, if any.
    ///
    /// An entry that does not parse as a UUID is dropped with a warning;
    /// the durable store never depends on queue contents.
    pub async fn pop(&self) -> Result<Option<Uuid>, redis::RedisError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(&self.key, None).await?;

        match raw {
            Some(value) => match value.parse::<Uuid>() {
                Ok(id) => Ok(Some(id)),
                Err(_) => {
                    warn!(entry = %value, "Dropping malformed fast queue entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Current queue length.
    pub async fn len(&self) -> Result<usize, redis::RedisError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.key).await?;
        Ok(len)
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> Result<bool, redis::RedisError> {
        Ok(self.len().await? == 0)
    }
}
