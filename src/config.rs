//! Configuration for dropline
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::livehouse::LiveConfig;

/// dropline - drop report intake and live matrix push
#[derive(Parser, Debug, Clone)]
#[command(name = "dropline")]
#[command(about = "Drop report intake gateway and live matrix update push service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory queue when NATS is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// JSON catalog of items and stages
    #[arg(long, env = "CATALOG_PATH")]
    pub catalog_path: Option<PathBuf>,

    /// Server ping interval on live connections, in milliseconds
    #[arg(long, env = "LIVE_PING_INTERVAL_MS", default_value = "15000")]
    pub live_ping_interval_ms: u64,

    /// How long a ping may go unanswered before the connection is closed
    #[arg(long, env = "LIVE_LIVENESS_WINDOW_MS", default_value = "45000")]
    pub live_liveness_window_ms: u64,

    /// Outbound queue depth per live connection, in frames
    #[arg(long, env = "LIVE_OUTBOUND_CAPACITY", default_value = "64")]
    pub live_outbound_capacity: usize,

    /// NATS subject carrying matrix delta batches
    #[arg(long, env = "MATRIX_DELTA_SUBJECT", default_value = "MATRIX.DELTA")]
    pub matrix_delta_subject: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Liveness timing for live sessions
    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            ping_interval: Duration::from_millis(self.live_ping_interval_ms),
            liveness_window: Duration::from_millis(self.live_liveness_window_ms),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.live_ping_interval_ms == 0 {
            return Err("LIVE_PING_INTERVAL_MS must be greater than 0".to_string());
        }

        if self.live_liveness_window_ms <= self.live_ping_interval_ms {
            return Err(
                "LIVE_LIVENESS_WINDOW_MS must be greater than LIVE_PING_INTERVAL_MS".to_string(),
            );
        }

        if self.live_outbound_capacity == 0 {
            return Err("LIVE_OUTBOUND_CAPACITY must be greater than 0".to_string());
        }

        if self.matrix_delta_subject.trim().is_empty() {
            return Err("MATRIX_DELTA_SUBJECT must not be empty".to_string());
        }

        Ok(())
    }
}
