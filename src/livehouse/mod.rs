//! Live matrix update push
//!
//! Clients open a WebSocket, subscribe to stage or item buckets and receive
//! matrix deltas for those buckets as binary frames.

pub mod bucket;
pub mod feed;
pub mod registry;
pub mod session;
pub mod wire;

pub use bucket::{BucketKey, MatrixElement, MatrixSegment};
pub use feed::{parse_delta_batch, spawn_delta_feed, DEFAULT_DELTA_SUBJECT};
pub use registry::{ConnectionId, PublishSummary, SubscriptionRegistry, DEFAULT_OUTBOUND_CAPACITY};
pub use session::{run_session, CloseReason, ConnectionPhase, LiveConfig};
pub use wire::{Frame, MessageCategory, MessageType};
