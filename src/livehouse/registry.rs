//! Subscription registry
//!
//! Connections live in an arena keyed by `ConnectionId`; the bucket index
//! only stores ids. One lock serializes subscribe, unsubscribe, deregister
//! and publish, so each bucket sees a single total order of events.
//!
//! Each connection has a bounded outbound queue. Publishing never waits on
//! a connection: if its queue is full the connection is dropped from the
//! registry and told to close (disconnect-on-overflow). A client that falls
//! behind reconnects and resubscribes rather than receiving a gapped stream.

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bucket::{BucketKey, MatrixSegment};
use super::wire::{Frame, MatrixUpdateMessage, Segment};
use crate::types::{DroplineError, Result};

/// Default outbound queue depth per connection, in frames
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Opaque connection identifier
pub type ConnectionId = u64;

/// What a session gets back from `register`
pub struct ConnectionHandle {
    pub id: ConnectionId,
    /// Frames queued for this connection
    pub outbound: mpsc::Receiver<Frame>,
    /// For the session's own replies (pong, responses)
    pub sender: mpsc::Sender<Frame>,
    /// Cancelled when the registry evicts the connection
    pub closing: CancellationToken,
}

struct ConnectionSlot {
    outbound: mpsc::Sender<Frame>,
    closing: CancellationToken,
    /// Bucket -> last delivered sequence number
    subscriptions: HashMap<BucketKey, u64>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: ConnectionId,
    connections: HashMap<ConnectionId, ConnectionSlot>,
    buckets: HashMap<BucketKey, HashSet<ConnectionId>>,
    /// Last sequence issued per bucket. Never pruned, so a bucket keeps
    /// counting after its last subscriber leaves. Bounded by the catalog's
    /// stages and items, one entry per bucket ever published.
    sequences: HashMap<BucketKey, u64>,
}

impl RegistryInner {
    fn next_seq(&mut self, bucket: &BucketKey) -> u64 {
        let seq = self.sequences.entry(bucket.clone()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Drop a connection and every index entry pointing at it
    fn remove_connection(&mut self, id: ConnectionId) -> Option<usize> {
        let slot = self.connections.remove(&id)?;
        for bucket in slot.subscriptions.keys() {
            if let Some(ids) = self.buckets.get_mut(bucket) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.buckets.remove(bucket);
                }
            }
        }
        slot.closing.cancel();
        Some(slot.subscriptions.len())
    }
}

/// Outcome of a publish
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    /// Connections that received a message
    pub delivered: usize,
    /// Connections evicted because their queue was full or closed
    pub evicted: Vec<ConnectionId>,
}

/// Bucket -> connections fan-out
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
    outbound_capacity: usize,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl SubscriptionRegistry {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Add a connection with no subscriptions
    pub async fn register(&self) -> ConnectionHandle {
        let (sender, outbound) = mpsc::channel(self.outbound_capacity);
        let closing = CancellationToken::new();

        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.connections.insert(
            id,
            ConnectionSlot {
                outbound: sender.clone(),
                closing: closing.clone(),
                subscriptions: HashMap::new(),
            },
        );
        debug!("Live connection {} registered ({} total)", id, inner.connections.len());

        ConnectionHandle {
            id,
            outbound,
            sender,
            closing,
        }
    }

    /// Subscribe a connection to a bucket. Returns `false` if it already was.
    pub async fn subscribe(&self, id: ConnectionId, bucket: BucketKey) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let slot = inner
            .connections
            .get_mut(&id)
            .ok_or_else(|| DroplineError::NotFound(format!("connection {}", id)))?;
        if slot.subscriptions.contains_key(&bucket) {
            return Ok(false);
        }

        // Start from the current position; earlier deltas are not replayed
        let current = inner.sequences.get(&bucket).copied().unwrap_or(0);
        slot.subscriptions.insert(bucket.clone(), current);
        inner.buckets.entry(bucket.clone()).or_default().insert(id);
        debug!("Connection {} subscribed to {}", id, bucket);
        Ok(true)
    }

    /// Remove one subscription. Returns `false` if there was none.
    pub async fn unsubscribe(&self, id: ConnectionId, bucket: &BucketKey) -> Result<bool> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let slot = inner
            .connections
            .get_mut(&id)
            .ok_or_else(|| DroplineError::NotFound(format!("connection {}", id)))?;
        if slot.subscriptions.remove(bucket).is_none() {
            return Ok(false);
        }

        if let Some(ids) = inner.buckets.get_mut(bucket) {
            ids.remove(&id);
            if ids.is_empty() {
                inner.buckets.remove(bucket);
            }
        }
        debug!("Connection {} unsubscribed from {}", id, bucket);
        Ok(true)
    }

    /// Remove a connection and all its subscriptions
    pub async fn deregister(&self, id: ConnectionId) -> usize {
        let mut inner = self.inner.lock().await;
        let removed = inner.remove_connection(id).unwrap_or(0);
        debug!(
            "Live connection {} deregistered, {} subscriptions dropped",
            id, removed
        );
        removed
    }

    /// Close every connection, used on server shutdown
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let ids: Vec<ConnectionId> = inner.connections.keys().copied().collect();
        for id in &ids {
            inner.remove_connection(*id);
        }
        if !ids.is_empty() {
            info!("Closed {} live connections", ids.len());
        }
        ids.len()
    }

    /// Fan segments out to subscribers
    ///
    /// Each connection gets at most one message holding only the segments
    /// for buckets it subscribes to. Sequence numbers advance per bucket
    /// whether or not anyone is listening.
    pub async fn publish(&self, segments: Vec<MatrixSegment>) -> PublishSummary {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let mut per_connection: HashMap<ConnectionId, Vec<(BucketKey, Segment)>> = HashMap::new();
        for segment in &segments {
            let seq = inner.next_seq(&segment.bucket);
            let Some(ids) = inner.buckets.get(&segment.bucket) else {
                continue;
            };
            let wire = Segment::from_domain(segment, seq);
            for id in ids {
                per_connection
                    .entry(*id)
                    .or_default()
                    .push((segment.bucket.clone(), wire.clone()));
            }
        }

        let mut summary = PublishSummary::default();
        for (id, entries) in per_connection {
            let Some(slot) = inner.connections.get_mut(&id) else {
                continue;
            };
            let delivered: Vec<(BucketKey, u64)> = entries
                .iter()
                .map(|(bucket, segment)| (bucket.clone(), segment.seq))
                .collect();
            let message = MatrixUpdateMessage {
                segments: entries.into_iter().map(|(_, segment)| segment).collect(),
            };

            match slot.outbound.try_send(Frame::MatrixUpdate(message)) {
                Ok(()) => {
                    for (bucket, seq) in delivered {
                        slot.subscriptions.insert(bucket, seq);
                    }
                    summary.delivered += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Live connection {} outbound queue full, disconnecting", id);
                    summary.evicted.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    summary.evicted.push(id);
                }
            }
        }

        for id in &summary.evicted {
            inner.remove_connection(*id);
        }

        if !summary.evicted.is_empty() {
            info!("Evicted {} live connections during publish", summary.evicted.len());
        }
        summary
    }

    /// Number of connections subscribed to a bucket
    pub async fn subscriber_count(&self, bucket: &BucketKey) -> usize {
        self.inner
            .lock()
            .await
            .buckets
            .get(bucket)
            .map_or(0, HashSet::len)
    }

    /// Number of buckets a connection subscribes to, `None` if unknown
    pub async fn subscription_count(&self, id: ConnectionId) -> Option<usize> {
        self.inner
            .lock()
            .await
            .connections
            .get(&id)
            .map(|slot| slot.subscriptions.len())
    }

    /// Last sequence number delivered to a connection for a bucket
    pub async fn last_delivered(&self, id: ConnectionId, bucket: &BucketKey) -> Option<u64> {
        self.inner
            .lock()
            .await
            .connections
            .get(&id)
            .and_then(|slot| slot.subscriptions.get(bucket).copied())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }
}
