//! HTTP routes for dropline

pub mod health;
pub mod live;
pub mod report;

pub use health::health_check;
pub use live::handle_live_ws;
pub use report::{error_response, handle_batch, handle_recall, handle_single, json_response};
