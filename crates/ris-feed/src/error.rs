//! Error types for the RIS Live feed.

use tokio_tungstenite::tungstenite;

/// Errors raised while talking to RIS Live.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    /// A message could not be encoded or decoded.
    #[error("invalid RIS message: {0}")]
    Json(#[from] serde_json::Error),
    /// The server answered with a `ris_error` message.
    #[error("RIS Live rejected the request: {0}")]
    Server(String),
    /// The background tap task panicked or was aborted.
    #[error("feed task failed: {0}")]
    Task(String),
}

impl From<tungstenite::Error> for FeedError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Result alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
