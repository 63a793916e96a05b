//! Per-connection live session
//!
//! One reader loop and one writer task per WebSocket. The reader handles
//! client frames and runs the liveness timer; the writer drains the
//! connection's outbound queue. Teardown always deregisters from the
//! registry before the socket is closed.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::registry::{ConnectionId, SubscriptionRegistry};
use super::wire::{Frame, Ping, Pong, SubscribeResp, UnsubscribeResp};

/// Default interval between server pings
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Default time a ping may go unanswered
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(45);

/// Bound on the close handshake with a peer that may not be reading
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long teardown waits for the writer before aborting it
const WRITER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness timing for a session
#[derive(Debug, Clone, Copy)]
pub struct LiveConfig {
    pub ping_interval: Duration,
    pub liveness_window: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            liveness_window: DEFAULT_LIVENESS_WINDOW,
        }
    }
}

/// Connection lifecycle as seen by the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connected,
    Subscribed,
    Closing,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    LivenessTimeout,
    /// Removed by the registry (outbound overflow or shutdown)
    Evicted,
    Transport(String),
}

/// Ping bookkeeping for one connection
#[derive(Debug, Default)]
pub struct Liveness {
    next_seq: u64,
    /// Oldest ping not yet answered
    awaiting: Option<(u64, Instant)>,
}

impl Liveness {
    /// Issue the next ping. Keeps the oldest outstanding deadline.
    pub fn next_ping(&mut self, now: Instant) -> Ping {
        self.next_seq += 1;
        if self.awaiting.is_none() {
            self.awaiting = Some((self.next_seq, now));
        }
        Ping { seq: self.next_seq }
    }

    /// Record a pong. Answers to a later ping also prove liveness.
    pub fn on_pong(&mut self, seq: u64) -> bool {
        match self.awaiting {
            Some((waiting, _)) if seq >= waiting && seq <= self.next_seq => {
                self.awaiting = None;
                true
            }
            _ => false,
        }
    }

    /// When the connection is presumed dead, if a ping is outstanding
    pub fn deadline(&self, window: Duration) -> Option<Instant> {
        self.awaiting.map(|(_, sent)| sent + window)
    }
}

/// Run a session until the peer leaves, liveness fails or the registry
/// evicts it
pub async fn run_session<S>(registry: Arc<SubscriptionRegistry>, ws: S, config: LiveConfig) -> CloseReason
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin + 'static,
{
    let handle = registry.register().await;
    let id = handle.id;
    let sender = handle.sender;
    let closing = handle.closing;
    let mut outbound = handle.outbound;

    let (mut write, mut read) = ws.split();
    info!("Live connection {} opened", id);

    let writer_closing = closing.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = writer_closing.cancelled() => break,
            };
            // A peer that stops reading stalls the send
            tokio::select! {
                sent = write.send(Message::Binary(frame.encode())) => {
                    if sent.is_err() {
                        break;
                    }
                }
                _ = writer_closing.cancelled() => break,
            }
        }
        if tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await.is_err() {
            debug!("Live connection {} close handshake timed out", id);
        }
    });

    let mut liveness = Liveness::default();
    let mut ticker = tokio::time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        let deadline = liveness.deadline(config.liveness_window);

        tokio::select! {
            _ = closing.cancelled() => break CloseReason::Evicted,

            _ = ticker.tick() => {
                let ping = liveness.next_ping(Instant::now());
                if !enqueue(&sender, id, Frame::Ping(ping)) {
                    break CloseReason::Evicted;
                }
            }

            _ = wait_until(deadline) => {
                warn!("Live connection {} missed pong, closing", id);
                break CloseReason::LivenessTimeout;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    let reply = handle_frame(&registry, id, &data, &mut liveness).await;
                    if let Some(reply) = reply {
                        if !enqueue(&sender, id, reply) {
                            break CloseReason::Evicted;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break CloseReason::PeerClosed,
                Some(Ok(_)) => continue,
                Some(Err(e)) => break CloseReason::Transport(e.to_string()),
            },
        }
    };

    // Deregister first so no publish targets a dead connection
    let dropped = registry.deregister(id).await;
    closing.cancel();
    if tokio::time::timeout(WRITER_STOP_TIMEOUT, &mut writer).await.is_err() {
        warn!("Live connection {} writer did not stop, aborting", id);
        writer.abort();
    }

    info!(
        "Live connection {} closed ({:?}), {} subscriptions dropped",
        id, reason, dropped
    );
    reason
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Queue a frame the session produced itself. A full queue is an overflow
/// like any other and ends the connection.
fn enqueue(sender: &mpsc::Sender<Frame>, id: ConnectionId, frame: Frame) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Live connection {} outbound queue full, disconnecting", id);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Apply one client frame, returning the reply to queue if any
async fn handle_frame(
    registry: &SubscriptionRegistry,
    id: ConnectionId,
    data: &[u8],
    liveness: &mut Liveness,
) -> Option<Frame> {
    let frame = match Frame::decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Live connection {} sent undecodable frame: {}", id, e);
            return None;
        }
    };
    let request = frame.message_type();

    let reply = match frame {
        Frame::Ping(ping) => Some(Frame::Pong(Pong { seq: ping.seq })),
        Frame::Pong(pong) => {
            if !liveness.on_pong(pong.seq) {
                debug!("Live connection {} sent stale pong {}", id, pong.seq);
            }
            None
        }
        Frame::SubscribeReq(req) => match req.bucket() {
            Ok(bucket) => match registry.subscribe(id, bucket).await {
                Ok(_) => Some(Frame::SubscribeResp(SubscribeResp { seq: req.seq })),
                Err(e) => {
                    debug!("Live connection {} subscribe after eviction: {}", id, e);
                    None
                }
            },
            Err(e) => {
                warn!("Live connection {} bad subscribe request: {}", id, e);
                None
            }
        },
        Frame::UnsubscribeReq(req) => match req.bucket() {
            Ok(bucket) => match registry.unsubscribe(id, &bucket).await {
                Ok(_) => Some(Frame::UnsubscribeResp(UnsubscribeResp { seq: req.seq })),
                Err(e) => {
                    debug!("Live connection {} unsubscribe after eviction: {}", id, e);
                    None
                }
            },
            Err(e) => {
                warn!("Live connection {} bad unsubscribe request: {}", id, e);
                None
            }
        },
        other => {
            debug!(
                "Live connection {} sent server-only {:?}, ignoring",
                id,
                other.message_type()
            );
            None
        }
    };

    if let (Some(expected), Some(_)) = (request.response(), &reply) {
        let phase = connection_phase(registry, id).await;
        debug!(
            "Live connection {} {:?} answered with {:?}, now {:?}",
            id, request, expected, phase
        );
    }
    reply
}

/// Phase of a connection given its registry state
pub async fn connection_phase(registry: &SubscriptionRegistry, id: ConnectionId) -> ConnectionPhase {
    match registry.subscription_count(id).await {
        None => ConnectionPhase::Closing,
        Some(0) => ConnectionPhase::Connected,
        Some(_) => ConnectionPhase::Subscribed,
    }
}
