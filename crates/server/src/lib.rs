//! Conversation engine server: WebSocket transport and HTTP control surface.

pub mod http;
pub mod metrics;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use session::{Session, SessionManager};
pub use state::AppState;
pub use websocket::WebSocketHandler;

use axum::http::StatusCode;
use thiserror::Error;

/// Crate-wide error taxonomy (§7). `InvalidTransition` and `Cancelled` are
/// always recovered locally and never reach this type; everything here is
/// either surfaced to a caller directly or forces a session to ENDED.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("fatal internal error: {0}")]
    Fatal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
