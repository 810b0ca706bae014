//! Task queue backends
//!
//! Redis list semantics: producers `LPUSH`, consumers `BRPOP`, so tasks come
//! out in FIFO order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ranked_cache::SharedRedis;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::TaskEnvelope;
use crate::error::Result;

#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<()>;

    /// Wait up to `wait` for the next task.
    async fn dequeue(&self, wait: Duration) -> Result<Option<TaskEnvelope>>;
}

/// Redis-backed queue.
///
/// `BRPOP` holds its connection for the whole wait, so pops run on their
/// own connection and never stall pushes or cache traffic.
#[derive(Clone)]
pub struct RedisTaskQueue {
    push: SharedRedis,
    pop: SharedRedis,
    key: String,
}

impl RedisTaskQueue {
    pub fn new(push: SharedRedis, pop: SharedRedis, key: impl Into<String>) -> Self {
        Self {
            push,
            pop,
            key: key.into(),
        }
    }
}

#[async_trait::async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<()> {
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.push.lock().await;
        redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async::<_, i64>(&mut *conn)
            .await?;
        debug!(task_id = %envelope.id, kind = envelope.task.kind(), "Task enqueued");
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<TaskEnvelope>> {
        let mut conn = self.pop.lock().await;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(wait.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        let Some((_, payload)) = popped else {
            return Ok(None);
        };
        match serde_json::from_str::<TaskEnvelope>(&payload) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                // A poison message would otherwise be retried forever.
                warn!(error = %e, "Dropping undecodable task");
                Ok(None)
            }
        }
    }
}

/// In-process queue for tests and single-node runs.
#[derive(Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<VecDeque<TaskEnvelope>>,
    notify: Notify,
}

impl MemoryTaskQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<()> {
        self.tasks.lock().await.push_back(envelope);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<TaskEnvelope>> {
        if let Some(envelope) = self.tasks.lock().await.pop_front() {
            return Ok(Some(envelope));
        }
        let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        Ok(self.tasks.lock().await.pop_front())
    }
}
