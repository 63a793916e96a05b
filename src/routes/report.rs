//! Report intake endpoints
//!
//! - `POST /report` - single report
//! - `POST /report/batch` - batch of reports, all or nothing
//! - `POST /report/recall` - withdraw a stored report by hash
//!
//! A new anonymous identity, when one is issued, is returned in the
//! `X-Penguin-Set-PenguinID` header even if the submission itself fails.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::report::{
    BatchReportRequest, RecallOutcome, RecallRequest, RequestContext, SingleReportRequest,
};
use crate::server::AppState;
use crate::types::{DroplineError, Result};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SET_PENGUIN_ID_HEADER: &str = "x-penguin-set-penguinid";
const PENGUIN_ID_SCHEME: &str = "PenguinID";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportAccepted {
    report_hash: String,
}

/// Build the request context from headers and the peer address
pub fn request_context(headers: &HeaderMap, addr: SocketAddr) -> RequestContext {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string());

    let ctx = RequestContext::new(request_id, ip);
    match penguin_id_from_headers(headers) {
        Some(penguin_id) => ctx.with_penguin_id(penguin_id),
        None => ctx,
    }
}

/// `Authorization: PenguinID <id>`
fn penguin_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(hyper::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, id) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(PENGUIN_ID_SCHEME) {
        return None;
    }
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| DroplineError::Validation(format!("failed to read body: {}", e)))?
        .to_bytes();
    Ok(serde_json::from_slice(&body)?)
}

/// POST /report
pub async fn handle_single(
    state: Arc<AppState>,
    req: Request<Incoming>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = request_context(req.headers(), addr).with_cancel(cancel);

    let result = async {
        let body: SingleReportRequest = read_json(req).await?;
        state.pipeline.submit_single(&ctx, &body).await
    }
    .await;
    guard.disarm();

    accepted_response(&ctx, result)
}

/// POST /report/batch
pub async fn handle_batch(
    state: Arc<AppState>,
    req: Request<Incoming>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = request_context(req.headers(), addr).with_cancel(cancel);

    let result = async {
        let body: BatchReportRequest = read_json(req).await?;
        state.pipeline.submit_batch(&ctx, &body).await
    }
    .await;
    guard.disarm();

    accepted_response(&ctx, result)
}

/// POST /report/recall
pub async fn handle_recall(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let result = async {
        let body: RecallRequest = read_json(req).await?;
        state.pipeline.recall(&body.report_hash).await
    }
    .await;

    match result {
        Ok(RecallOutcome::Recalled) => empty_response(StatusCode::NO_CONTENT),
        Ok(RecallOutcome::NotFound) => error_response(DroplineError::NotFound(
            "report not existed or has already been recalled".into(),
        )),
        Err(e) => error_response(e),
    }
}

fn accepted_response(ctx: &RequestContext, result: Result<String>) -> Response<Full<Bytes>> {
    let mut response = match result {
        Ok(task_id) => {
            info!("[{}] report accepted as {}", ctx.request_id, task_id);
            json_response(StatusCode::OK, &ReportAccepted { report_hash: task_id })
        }
        Err(e) => {
            warn!("[{}] report rejected: {}", ctx.request_id, e);
            error_response(e)
        }
    };

    if let Some(issued) = ctx.issued_penguin_id() {
        if let Ok(value) = HeaderValue::from_str(issued) {
            response.headers_mut().insert(SET_PENGUIN_ID_HEADER, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => raw_json_response(status, Bytes::from(bytes)),
        Err(e) => error_response(DroplineError::Internal(e.to_string())),
    }
}

/// Error response with `{code, message}` body
pub fn error_response(err: DroplineError) -> Response<Full<Bytes>> {
    let (status, body) = err.into_status_code_and_body();
    raw_json_response(status, Bytes::from(body))
}

fn raw_json_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
