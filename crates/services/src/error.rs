//! Error taxonomy for the three external service calls (§7).

use voice_agent_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("transcription call failed: {0}")]
    Transcription(String),

    #[error("reasoning call failed: {0}")]
    Reasoning(String),

    #[error("synthesis call failed: {0}")]
    Synthesis(String),

    #[error("call timed out")]
    Timeout,

    /// The call was aborted by the caller's cancellation token. Absorbed
    /// silently by the orchestrator; never surfaced as an `error` event.
    #[error("cancelled")]
    Cancelled,
}

impl ServicesError {
    /// Maps a failed call to the FSM error kind the orchestrator should
    /// emit, or `None` if the failure was a cancellation (§4.3, §7).
    pub fn fsm_kind(&self, kind: ServiceKind) -> Option<ErrorKind> {
        if matches!(self, ServicesError::Cancelled) {
            return None;
        }
        Some(match kind {
            ServiceKind::Transcribe => ErrorKind::TranscriptionFailed,
            ServiceKind::Reason => ErrorKind::ReasoningFailed,
            ServiceKind::Synthesize => ErrorKind::SynthesisFailed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Transcribe,
    Reason,
    Synthesize,
}
