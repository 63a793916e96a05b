//! dropline - drop report intake and live matrix push
//!
//! ## Services
//!
//! - **Report intake**: validates, normalizes and queues drop reports on a
//!   durable JetStream stream, and recalls stored reports by hash
//! - **Live feed**: WebSocket push of matrix deltas to clients subscribed
//!   to stage or item buckets

pub mod config;
pub mod livehouse;
pub mod nats;
pub mod queue;
pub mod report;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{DroplineError, Result};
