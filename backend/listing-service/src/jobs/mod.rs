//! Background jobs keeping ranked listings in step with link writes
//!
//! Writers enqueue [`ListingTask`]s, workers pop them and hand them to the
//! [`UpdatePropagator`]. Delivery is at-least-once; every task is idempotent.

pub mod propagator;
pub mod queue;
pub mod worker;

use chrono::{DateTime, Utc};
use ranked_cache::Link;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use propagator::UpdatePropagator;
pub use queue::{MemoryTaskQueue, RedisTaskQueue, TaskQueue};
pub use worker::{spawn_workers, Worker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListingTask {
    LinkCreated { link: Link },
    LinkScoreChanged { link: Link },
    LinkRemoved { feed_id: Uuid, link_id: Uuid },
}

impl ListingTask {
    /// Metric label for the task type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LinkCreated { .. } => "link_created",
            Self::LinkScoreChanged { .. } => "link_score_changed",
            Self::LinkRemoved { .. } => "link_removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    /// Zero on first delivery.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub task: ListingTask,
}

impl TaskEnvelope {
    pub fn new(task: ListingTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 0,
            enqueued_at: Utc::now(),
            task,
        }
    }

    /// Same task, next attempt.
    pub fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_format() {
        let feed_id = Uuid::nil();
        let link_id = Uuid::nil();
        let task = ListingTask::LinkRemoved { feed_id, link_id };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "link_removed");
        assert_eq!(task.kind(), "link_removed");
    }

    #[test]
    fn test_retry_keeps_identity() {
        let envelope = TaskEnvelope::new(ListingTask::LinkRemoved {
            feed_id: Uuid::new_v4(),
            link_id: Uuid::new_v4(),
        });
        let retried = envelope.clone().retry();
        assert_eq!(retried.id, envelope.id);
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.task, envelope.task);
    }
}
