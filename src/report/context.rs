//! Per-request context handed to the pipeline by the HTTP layer

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Request-scoped data the pipeline needs but does not own
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace id of the inbound request, prefix of the task id
    pub request_id: String,
    /// Submitter IP
    pub ip: String,
    /// Client identity presented with the request, if any
    pub penguin_id: Option<String>,
    /// Fires when the caller goes away
    pub cancel: CancellationToken,
    /// Identity created for this request, read back by the HTTP layer
    /// whether or not the submission succeeds
    issued_penguin_id: Arc<OnceLock<String>>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ip: ip.into(),
            penguin_id: None,
            cancel: CancellationToken::new(),
            issued_penguin_id: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_penguin_id(mut self, penguin_id: impl Into<String>) -> Self {
        self.penguin_id = Some(penguin_id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record a newly created identity. First write wins.
    pub fn issue_penguin_id(&self, penguin_id: String) {
        let _ = self.issued_penguin_id.set(penguin_id);
    }

    pub fn issued_penguin_id(&self) -> Option<&str> {
        self.issued_penguin_id.get().map(String::as_str)
    }
}
