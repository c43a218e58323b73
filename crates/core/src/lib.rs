//! Core types shared across the voice conversation engine: audio frames and
//! buffers, the per-session finite state machine, and the crate-wide error
//! type.

pub mod audio;
pub mod config;
pub mod error;
pub mod fsm;

pub use audio::{AudioBuffer, AudioEncoding, AudioFrame, Channels, SampleRate};
pub use config::{CreateSessionRequest, Energy, Pace, SessionConfig, Tone, Voice};
pub use error::{Error, Result};
pub use fsm::{
    ConversationState, Effect, ErrorKind, Event, Fsm, FsmError, Metrics, PendingTurn, Transition,
    Turn,
};
