//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Upgrades are enabled
//! for the live feed.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::livehouse::{LiveConfig, SubscriptionRegistry};
use crate::report::ReportPipeline;
use crate::routes;
use crate::types::{DroplineError, Result};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub pipeline: Arc<ReportPipeline>,
    /// Live feed subscriptions
    pub registry: Arc<SubscriptionRegistry>,
    pub live: LiveConfig,
    /// "jetstream" or "memory"
    pub queue_backend: &'static str,
    pub started_at: Instant,
    /// Cancelled to stop accepting connections
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        args: Args,
        pipeline: Arc<ReportPipeline>,
        registry: Arc<SubscriptionRegistry>,
        queue_backend: &'static str,
    ) -> Self {
        let live = args.live_config();
        Self {
            args,
            pipeline,
            registry,
            live,
            queue_backend,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Start the HTTP server and serve until shutdown
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("dropline listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    serve(listener, state).await
}

/// Accept loop on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        let accepted = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }

    let closed = state.registry.close_all().await;
    info!("Server stopped, {} live connections closed", closed);
    Ok(())
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state)).await
        }

        (Method::GET, "/live") => routes::handle_live_ws(Arc::clone(&state), req).await,

        (Method::POST, "/report") => routes::handle_single(Arc::clone(&state), req, addr).await,

        (Method::POST, "/report/batch") => {
            routes::handle_batch(Arc::clone(&state), req, addr).await
        }

        (Method::POST, "/report/recall") => routes::handle_recall(Arc::clone(&state), req).await,

        (_, "/report") | (_, "/report/batch") | (_, "/report/recall") | (_, "/live") => {
            method_not_allowed()
        }

        _ => routes::error_response(DroplineError::NotFound(format!("no route for {}", path))),
    };

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn method_not_allowed() -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({
            "code": "METHOD_NOT_ALLOWED",
            "message": "method not allowed",
        }),
    )
}
