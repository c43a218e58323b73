//! VAD ingest and turn orchestration for a single conversation session.

pub mod orchestrator;
pub mod vad;

pub use orchestrator::{Orchestrator, OrchestratorEvent, TurnIdentity};
pub use vad::{EnergyVad, VadConfig, VadError, VadEvent};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("vad error: {0}")]
    Vad(#[from] vad::VadError),
}
