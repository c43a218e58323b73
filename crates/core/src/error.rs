//! Crate-wide error type for `voice-agent-core`.

/// Errors that can originate from core data-model operations (as opposed to
/// FSM-internal transition errors, which live in [`crate::fsm::FsmError`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fsm(#[from] crate::fsm::FsmError),

    #[error("malformed audio frame: {0}")]
    BadFrame(String),
}

pub type Result<T> = std::result::Result<T, Error>;
