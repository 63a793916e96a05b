//! Bounded-wait task commit
//!
//! Publishes a task and races the durable ack against a publish failure,
//! caller cancellation and a fixed timeout. Whichever finishes first
//! decides the result; the other branches are dropped on return.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::DurableQueue;
use crate::report::ReportTask;
use crate::types::{DroplineError, Result};

/// How long a submission may wait on the queue
pub const COMMIT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes report tasks and waits for their durable ack
#[derive(Clone)]
pub struct QueueCommitter {
    queue: Arc<dyn DurableQueue>,
}

impl QueueCommitter {
    pub fn new(queue: Arc<dyn DurableQueue>) -> Self {
        Self { queue }
    }

    /// Publish `task` to `subject` and return its task id once stored
    ///
    /// Never retries: a timed-out publish may still land, and publishing
    /// again would queue the task twice.
    pub async fn commit(
        &self,
        subject: &str,
        task: &ReportTask,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let payload = task
            .to_bytes()
            .map_err(|e| DroplineError::Internal(format!("failed to encode task: {}", e)))?;

        let publish = async {
            let ack = self.queue.publish_async(subject, payload).await?;
            ack.await.map_err(DroplineError::QueuePublish)
        };

        let outcome = tokio::select! {
            result = publish => result,
            _ = cancel.cancelled() => Err(DroplineError::Cancelled),
            _ = tokio::time::sleep(COMMIT_ACK_TIMEOUT) => Err(DroplineError::QueueTimeout),
        };

        match &outcome {
            Ok(()) => debug!("Task {} stored on {}", task.task_id, subject),
            Err(DroplineError::Cancelled) => {
                debug!("Task {} abandoned, caller cancelled", task.task_id)
            }
            Err(e) => warn!("Task {} not confirmed on {}: {}", task.task_id, subject, e),
        }

        outcome.map(|()| task.task_id.clone())
    }
}
