//! In-process queue
//!
//! Records every published message. Used by tests and by dev mode when no
//! NATS server is reachable.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use super::{AckFuture, DurableQueue};
use crate::types::{DroplineError, Result};

/// How the queue answers publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryQueueMode {
    /// Store and acknowledge immediately
    Ack,
    /// Accept the hand-off, then fail the ack with this reason
    Reject(String),
    /// Refuse the hand-off itself
    Refuse(String),
    /// Accept the hand-off and never acknowledge
    Hang,
}

pub struct MemoryQueue {
    mode: Mutex<MemoryQueueMode>,
    published: Mutex<Vec<(String, Bytes)>>,
}

impl MemoryQueue {
    pub fn new(mode: MemoryQueueMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: MemoryQueueMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// Messages that were acknowledged, in publish order
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn publish_async(&self, subject: &str, payload: Bytes) -> Result<AckFuture> {
        let mode = self
            .mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match mode {
            MemoryQueueMode::Ack => {
                debug!("Memory queue stored {} bytes on {}", payload.len(), subject);
                self.published
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((subject.to_string(), payload));
                Ok(Box::pin(async { Ok(()) }))
            }
            MemoryQueueMode::Reject(reason) => Ok(Box::pin(async move { Err(reason) })),
            MemoryQueueMode::Refuse(reason) => Err(DroplineError::QueuePublish(reason)),
            MemoryQueueMode::Hang => Ok(Box::pin(futures::future::pending())),
        }
    }
}
