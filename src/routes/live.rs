//! Live matrix update feed
//!
//! Connect: `ws://localhost:8080/live`
//!
//! Binary frames only: a 2-byte big-endian message type followed by a
//! protobuf body. Clients send subscribe and unsubscribe requests naming a
//! stage or an item and receive matrix update messages for those buckets.
//! The server pings periodically; a client that stops answering is closed.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

use super::report::error_response;
use crate::livehouse::run_session;
use crate::server::AppState;
use crate::types::DroplineError;

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Handle WebSocket upgrade for the live feed
pub async fn handle_live_ws(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(DroplineError::Validation("WebSocket upgrade required".into()));
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok(pair) => pair,
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            let mut response = error_response(DroplineError::WebSocket(e.to_string()));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };

    let registry = Arc::clone(&state.registry);
    let config = state.live;
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                let ws: HyperWebSocket = ws;
                let reason = run_session(registry, ws, config).await;
                debug!("Live session ended: {:?}", reason);
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}
