//! Listing task worker
//!
//! Pops tasks and applies them through the propagator. Lock timeouts and
//! store outages are re-queued with exponential backoff up to the attempt
//! limit; anything else is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{TaskEnvelope, TaskQueue, UpdatePropagator};
use crate::config::WorkerConfig;
use crate::metrics;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Pause after a queue error so a dead broker is not hammered.
const QUEUE_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    Ok,
    Retried,
    Dropped,
}

impl TaskResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Retried => "retried",
            Self::Dropped => "dropped",
        }
    }
}

/// Backoff before retry `attempt` (1-based): doubling from 100ms, capped at 10s, ±30% jitter.
pub fn retry_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let base = INITIAL_BACKOFF
        .saturating_mul(1u32 << exp)
        .min(MAX_BACKOFF);
    let jitter_factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
    Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
}

pub struct Worker {
    id: usize,
    queue: Arc<dyn TaskQueue>,
    propagator: Arc<UpdatePropagator>,
    max_attempts: u32,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn TaskQueue>,
        propagator: Arc<UpdatePropagator>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            id,
            queue,
            propagator,
            max_attempts: config.max_attempts.max(1),
            poll_interval: Duration::from_secs(config.poll_secs.max(1)),
        }
    }

    /// Run until `shutdown` flips to true. An in-flight task is finished first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "Listing worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = self.queue.dequeue(self.poll_interval) => next,
            };

            match next {
                Ok(Some(envelope)) => {
                    self.process(envelope).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker = self.id, error = %e, "Task queue unavailable");
                    sleep(QUEUE_ERROR_PAUSE).await;
                }
            }
        }

        info!(worker = self.id, "Listing worker stopped");
    }

    /// Apply one task and record the outcome.
    pub async fn process(&self, envelope: TaskEnvelope) -> TaskResult {
        let kind = envelope.task.kind();
        let result = match self.propagator.handle(&envelope.task).await {
            Ok(()) => {
                debug!(worker = self.id, task_id = %envelope.id, kind, "Task applied");
                TaskResult::Ok
            }
            Err(e) if e.is_transient() && envelope.attempt + 1 < self.max_attempts => {
                let retry = envelope.retry();
                let delay = retry_backoff(retry.attempt);
                warn!(
                    worker = self.id,
                    task_id = %retry.id,
                    kind,
                    attempt = retry.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Task failed, retrying"
                );
                sleep(delay).await;
                let task_id = retry.id;
                match self.queue.enqueue(retry).await {
                    Ok(()) => TaskResult::Retried,
                    Err(enqueue_err) => {
                        error!(
                            task_id = %task_id,
                            kind,
                            error = %enqueue_err,
                            "Failed to re-enqueue task"
                        );
                        TaskResult::Dropped
                    }
                }
            }
            Err(e) => {
                error!(
                    worker = self.id,
                    task_id = %envelope.id,
                    kind,
                    attempt = envelope.attempt,
                    error = %e,
                    "Task dropped"
                );
                TaskResult::Dropped
            }
        };

        metrics::record_task(kind, result.as_str());
        result
    }
}

/// Start `config.concurrency` workers sharing one queue.
pub fn spawn_workers(
    queue: Arc<dyn TaskQueue>,
    propagator: Arc<UpdatePropagator>,
    config: &WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..config.concurrency.max(1))
        .map(|id| {
            let worker = Worker::new(id, queue.clone(), propagator.clone(), config);
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
