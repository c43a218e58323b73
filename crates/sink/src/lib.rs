//! Durable, best-effort persistence of session, turn, and transition rows
//! to ScyllaDB (§4.7). Writes never block or fail the session they
//! describe; see [`writer::Sink`].

pub mod client;
pub mod error;
pub mod schema;
pub mod writer;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::SinkError;
pub use writer::{NullSink, SessionSink, Sink};

pub async fn connect(config: ScyllaConfig) -> Result<std::sync::Arc<Sink>, SinkError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    Ok(Sink::new(client))
}
