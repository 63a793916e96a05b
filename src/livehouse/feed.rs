//! Matrix delta feed
//!
//! The matrix computation publishes JSON delta batches on a NATS subject.
//! Each batch becomes one registry publish.

use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bucket::{BucketKey, MatrixElement, MatrixSegment};
use super::registry::SubscriptionRegistry;
use crate::nats::NatsClient;
use crate::types::{DroplineError, Result};

/// Default subject for matrix deltas
pub const DEFAULT_DELTA_SUBJECT: &str = "MATRIX.DELTA";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaBatch {
    segments: Vec<DeltaSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaSegment {
    stage_id: Option<String>,
    item_id: Option<String>,
    #[serde(default)]
    elements: Vec<DeltaElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaElement {
    stage_id: Option<String>,
    item_id: Option<String>,
    amount: i64,
}

/// Parse one delta batch payload
pub fn parse_delta_batch(payload: &[u8]) -> Result<Vec<MatrixSegment>> {
    let batch: DeltaBatch = serde_json::from_slice(payload)
        .map_err(|e| DroplineError::Protocol(format!("invalid delta batch: {}", e)))?;

    batch
        .segments
        .into_iter()
        .map(|segment| {
            let bucket = BucketKey::from_selector(segment.stage_id, segment.item_id)?;
            let elements = segment
                .elements
                .into_iter()
                .map(|element| {
                    let coordinate = BucketKey::from_selector(element.stage_id, element.item_id)?;
                    Ok(MatrixElement::new(coordinate, element.amount))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(MatrixSegment::new(bucket, elements))
        })
        .collect()
}

/// Forward delta batches from `subject` into the registry until cancelled
pub async fn spawn_delta_feed(
    nats: NatsClient,
    subject: String,
    registry: Arc<SubscriptionRegistry>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let mut subscriber = nats.subscribe(&subject).await?;
    info!("Matrix delta feed listening on {} as {}", subject, nats.name());

    Ok(tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = subscriber.next() => match msg {
                    Some(msg) => msg,
                    None => {
                        error!("Matrix delta subscription on {} ended", subject);
                        break;
                    }
                },
            };

            let segments = match parse_delta_batch(&msg.payload) {
                Ok(segments) => segments,
                Err(e) => {
                    warn!("Dropping delta batch: {}", e);
                    continue;
                }
            };
            if segments.is_empty() {
                continue;
            }

            let summary = registry.publish(segments).await;
            debug!(
                "Delta batch delivered to {} connections, {} evicted",
                summary.delivered,
                summary.evicted.len()
            );
        }
        info!("Matrix delta feed stopped");
    }))
}
