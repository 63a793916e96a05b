//! JetStream-backed report queue

use async_nats::jetstream::{self, stream::Stream};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use super::{AckFuture, DurableQueue};
use crate::nats::NatsClient;
use crate::types::{DroplineError, Result};

/// Stream holding report tasks until the aggregator consumes them
pub const STREAM_NAME: &str = "REPORT";

/// Subjects captured by the stream
pub const STREAM_SUBJECTS: &str = "REPORT.>";

/// Durable queue on a file-backed JetStream stream
pub struct JetStreamQueue {
    jetstream: jetstream::Context,
}

impl JetStreamQueue {
    /// Bind to JetStream, creating the report stream if needed
    pub async fn new(nats: &NatsClient) -> Result<Self> {
        let queue = Self {
            jetstream: jetstream::new(nats.inner().clone()),
        };
        queue.ensure_stream().await?;
        Ok(queue)
    }

    async fn ensure_stream(&self) -> Result<Stream> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![STREAM_SUBJECTS.to_string()],
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| DroplineError::Nats(format!("Failed to create stream: {}", e)))?;

        info!("Using stream {} for report tasks", STREAM_NAME);
        Ok(stream)
    }
}

#[async_trait]
impl DurableQueue for JetStreamQueue {
    async fn publish_async(&self, subject: &str, payload: Bytes) -> Result<AckFuture> {
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| DroplineError::QueuePublish(e.to_string()))?;

        Ok(Box::pin(async move {
            ack.await.map(|_| ()).map_err(|e| e.to_string())
        }))
    }
}
