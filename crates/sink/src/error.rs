//! Sink error taxonomy (§7). Every variant is swallowed after logging by
//! the writer; nothing here ever propagates to a session as a failure.

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("scylla connection error: {0}")]
    Connection(String),

    #[error("scylla query error: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;
