//! Durable report queue
//!
//! Tasks are published to a JetStream stream and the submitting request
//! waits, for a bounded time, on the durable-write acknowledgement.

pub mod committer;
pub mod jetstream;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::types::Result;

pub use committer::{QueueCommitter, COMMIT_ACK_TIMEOUT};
pub use jetstream::JetStreamQueue;
pub use memory::{MemoryQueue, MemoryQueueMode};

/// Subject for single-report tasks
pub const SUBJECT_SINGLE: &str = "REPORT.SINGLE";

/// Subject for batch-report tasks
pub const SUBJECT_BATCH: &str = "REPORT.BATCH";

/// Resolves once the queue has durably stored the message, or with the
/// reason it refused to.
pub type AckFuture = BoxFuture<'static, std::result::Result<(), String>>;

/// An at-least-once message queue with asynchronous acknowledgement
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Hand a message to the queue client.
    ///
    /// Returns as soon as the client has accepted the message for sending;
    /// the returned future tracks the durable ack.
    async fn publish_async(&self, subject: &str, payload: Bytes) -> Result<AckFuture>;
}
