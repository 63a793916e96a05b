//! Error types for Dropline

use hyper::StatusCode;

/// Main error type for Dropline operations
#[derive(Debug, thiserror::Error)]
pub enum DroplineError {
    /// Malformed submission: unknown drop type, bad batch element, etc.
    /// Never retried, surfaced to the caller verbatim.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No ack within the commit window. The task may or may not be stored.
    #[error("timeout waiting for queue acknowledgement")]
    QueueTimeout,

    /// The queue rejected the publish. Nothing was stored.
    #[error("Queue publish failed: {0}")]
    QueuePublish(String),

    /// The caller went away while waiting on the queue.
    #[error("Request cancelled by caller")]
    Cancelled,

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DroplineError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::QueueTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::QueuePublish(_) => StatusCode::SERVICE_UNAVAILABLE,
            // Client closed request
            Self::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::WebSocket(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::QueueTimeout => "QUEUE_TIMEOUT",
            Self::QueuePublish(_) => "QUEUE_UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::Repository(_) => "REPOSITORY_UNAVAILABLE",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Nats(_) => "NATS_UNAVAILABLE",
            Self::WebSocket(_) => "WEBSOCKET_ERROR",
            Self::Internal(_) | Self::Config(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        })
        .to_string();
        (status, body)
    }
}

impl From<std::io::Error> for DroplineError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for DroplineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for DroplineError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DroplineError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<prost::DecodeError> for DroplineError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Protocol(format!("decode failed: {}", err))
    }
}

impl From<async_nats::Error> for DroplineError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

/// Result type alias for Dropline operations
pub type Result<T> = std::result::Result<T, DroplineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_errors_are_distinguishable() {
        assert_eq!(DroplineError::QueueTimeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            DroplineError::QueuePublish("stream offline".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_ne!(
            DroplineError::QueueTimeout.code(),
            DroplineError::QueuePublish(String::new()).code()
        );
    }

    #[test]
    fn test_cancelled_maps_to_client_closed() {
        assert_eq!(DroplineError::Cancelled.status_code().as_u16(), 499);
    }

    #[test]
    fn test_error_body_is_json() {
        let (status, body) =
            DroplineError::Validation("unknown drop type".into()).into_status_code_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["code"], "INVALID_REQUEST");
        assert!(value["message"].as_str().unwrap().contains("unknown drop type"));
    }
}
