//! Conversation state machine: the nine-state turn lifecycle and its legal
//! transition table.
//!
//! Mirrors the shape of a stage-transition table keyed by a static lookup
//! (`ConversationState` -> allowed next states) rather than a match
//! expression, so the table is data, not control flow, and can be asserted
//! against directly in tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::{AudioBuffer, AudioFrame};

/// One of the nine states a session's current turn can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Listening,
    Transcribing,
    Interpreting,
    Answering,
    Speaking,
    Interrupted,
    Error,
    Ended,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::Idle
    }
}

impl ConversationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Interpreting => "interpreting",
            Self::Answering => "answering",
            Self::Speaking => "speaking",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
            Self::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

static LEGAL_TRANSITIONS: Lazy<HashMap<ConversationState, &'static [ConversationState]>> =
    Lazy::new(|| {
        use ConversationState::*;
        let mut map = HashMap::new();
        map.insert(Idle, &[Listening, Ended] as &[_]);
        map.insert(Listening, &[Transcribing, Idle, Interrupted, Ended] as &[_]);
        map.insert(
            Transcribing,
            &[Interpreting, Listening, Interrupted, Error, Ended] as &[_],
        );
        map.insert(Interpreting, &[Answering, Interrupted, Error, Ended] as &[_]);
        map.insert(Answering, &[Speaking, Interrupted, Error, Ended] as &[_]);
        map.insert(
            Speaking,
            &[Listening, Idle, Interrupted, Error, Ended] as &[_],
        );
        map.insert(Interrupted, &[Listening, Idle, Ended] as &[_]);
        map.insert(Error, &[Idle, Listening, Ended] as &[_]);
        map.insert(Ended, &[] as &[_]);
        map
    });

impl ConversationState {
    /// States reachable from this one in a single legal transition.
    pub fn allowed_transitions(&self) -> &'static [ConversationState] {
        LEGAL_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

/// Failure kinds an external service call can report to the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TranscriptionFailed,
    ReasoningFailed,
    SynthesisFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TranscriptionFailed => "transcription_failed",
            Self::ReasoningFailed => "reasoning_failed",
            Self::SynthesisFailed => "synthesis_failed",
        };
        write!(f, "{s}")
    }
}

/// Events the FSM consumes. Named the way the external world names them,
/// not the way the implementation happens to represent them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    VadStarted,
    VadEnded,
    UserAudio,
    UserInterrupt,
    TranscriptionFinal { text: String },
    LlmResponseComplete { response: String, citations: Vec<serde_json::Value> },
    TtsStarted { stream_handle: String, audio_duration_ms: u64 },
    TtsComplete,
    Error { kind: ErrorKind },
    End,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::VadStarted => "vad_started",
            Self::VadEnded => "vad_ended",
            Self::UserAudio => "user_audio",
            Self::UserInterrupt => "user_interrupt",
            Self::TranscriptionFinal { .. } => "transcription_final",
            Self::LlmResponseComplete { .. } => "llm_response_complete",
            Self::TtsStarted { .. } => "tts_started",
            Self::TtsComplete => "tts_complete",
            Self::Error { .. } => "error",
            Self::End => "end",
        }
    }
}

/// Errors the FSM module itself can raise. `InvalidTransition` is always
/// recovered locally (§7 taxonomy); `Fatal` forces the owning session to
/// ENDED.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FsmError {
    #[error("invalid transition from {from} on event {event}")]
    InvalidTransition { from: ConversationState, event: String },

    #[error("fatal: FSM observed state {0} outside the transition table")]
    Fatal(ConversationState),
}

/// One completed user-turn -> assistant-turn cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: Uuid,
    pub user_text: String,
    pub assistant_text: String,
    #[serde(default)]
    pub citations: Vec<serde_json::Value>,
    pub audio_duration_ms: u64,
    pub latency_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Immutable record of one state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

/// A turn-under-construction: partial state accumulated while a turn is
/// in flight, discarded unless it completes cleanly (SPEAKING -> IDLE).
#[derive(Debug, Clone, Default)]
pub struct PendingTurn {
    pub user_text: Option<String>,
    pub assistant_text: Option<String>,
    pub citations: Vec<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub audio_duration_ms: u64,
}

/// Rolling counters the FSM maintains as a side effect of transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub total_turns: u64,
    pub cumulative_duration_ms: u64,
    pub avg_latency_ms: f64,
    pub interrupt_count: u64,
    pub error_count: u64,
    pub backpressure_drop_count: u64,
}

impl Metrics {
    fn record_turn_latency(&mut self, latency_ms: u64) {
        self.total_turns += 1;
        let n = self.total_turns as f64;
        self.avg_latency_ms += (latency_ms as f64 - self.avg_latency_ms) / n;
    }
}

/// Side effects the FSM asks its caller to carry out after a transition.
/// The FSM never talks to the Orchestrator or Transport directly; it only
/// reports what should happen.
#[derive(Debug, Clone)]
pub enum Effect {
    StopSynthesis { stream_handle: String },
    StopPlayback,
}

/// The per-session finite state machine. Owns the buffers and history the
/// data model assigns to state transitions (§3); does not own transport or
/// service-call concerns.
pub struct Fsm {
    state: ConversationState,
    pub history: Vec<Turn>,
    pub state_history: Vec<Transition>,
    pub audio_buffer: AudioBuffer,
    pub transcript_slot: Option<String>,
    pub tts_stream_handle: Option<String>,
    pending_turn: PendingTurn,
    pre_interrupt_state: Option<ConversationState>,
    pub metrics: Metrics,
}

impl Default for Fsm {
    fn default() -> Self {
        Self::new()
    }
}

impl Fsm {
    pub fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            history: Vec::new(),
            state_history: Vec::new(),
            audio_buffer: AudioBuffer::with_default_cap(),
            transcript_slot: None,
            tts_stream_handle: None,
            pending_turn: PendingTurn::default(),
            pre_interrupt_state: None,
            metrics: Metrics::default(),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        self.state.can_transition_to(target)
    }

    /// Append an inbound frame to the audio buffer, accounting for any
    /// samples the soft cap drops. Call before `handle(Event::UserAudio)`.
    pub fn push_audio_frame(&mut self, frame: &AudioFrame) {
        let dropped = self.audio_buffer.push(frame);
        if dropped > 0 {
            self.metrics.backpressure_drop_count += dropped as u64;
        }
    }

    fn transition(
        &mut self,
        to: ConversationState,
        event: &Event,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), FsmError> {
        if !self.state.can_transition_to(to) {
            return Err(FsmError::InvalidTransition {
                from: self.state,
                event: event.name().to_string(),
            });
        }
        let from = self.state;
        self.state = to;
        self.state_history.push(Transition {
            from,
            to,
            event: event.name().to_string(),
            metadata,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Apply one event. Illegal transitions are swallowed as a no-op per
    /// §4.1 ("Illegal transitions = no-op + logged, not failed") -- the
    /// caller is expected to log the returned error, not propagate it as a
    /// session failure.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Effect>, FsmError> {
        use ConversationState::*;

        match &event {
            Event::UserAudio => {
                if self.state == Idle {
                    self.transition(Listening, &event, None)?;
                }
                return Ok(vec![]);
            }
            Event::VadStarted => {
                if matches!(self.state, Answering | Speaking) {
                    return self.begin_interrupt(&event);
                }
                if self.state == Idle {
                    self.transition(Listening, &event, None)?;
                }
                return Ok(vec![]);
            }
            Event::VadEnded => {
                if self.state != Listening {
                    return Ok(vec![]);
                }
                if self.audio_buffer.is_empty() {
                    self.transition(Idle, &event, None)?;
                } else {
                    self.pending_turn.started_at = Some(Utc::now());
                    self.transition(Transcribing, &event, None)?;
                }
                return Ok(vec![]);
            }
            Event::UserInterrupt => {
                if matches!(self.state, Answering | Speaking) {
                    return self.begin_interrupt(&event);
                }
                return Ok(vec![]);
            }
            Event::TranscriptionFinal { text } => {
                if self.state != Transcribing {
                    return Ok(vec![]);
                }
                self.audio_buffer.clear();
                if text.trim().is_empty() {
                    self.transcript_slot = None;
                    self.transition(Listening, &event, None)?;
                } else {
                    self.transcript_slot = Some(text.clone());
                    self.pending_turn.user_text = Some(text.clone());
                    self.transition(Interpreting, &event, None)?;
                }
                return Ok(vec![]);
            }
            Event::LlmResponseComplete { response, citations } => {
                if self.state != Interpreting {
                    return Ok(vec![]);
                }
                self.pending_turn.assistant_text = Some(response.clone());
                self.pending_turn.citations = citations.clone();
                self.transition(Answering, &event, None)?;
                return Ok(vec![]);
            }
            Event::TtsStarted { stream_handle, audio_duration_ms } => {
                if self.state != Answering {
                    return Ok(vec![]);
                }
                self.tts_stream_handle = Some(stream_handle.clone());
                self.pending_turn.audio_duration_ms = *audio_duration_ms;
                self.transition(Speaking, &event, None)?;
                return Ok(vec![]);
            }
            Event::TtsComplete => {
                if self.state != Speaking {
                    return Ok(vec![]);
                }
                self.complete_turn();
                self.transition(Idle, &event, None)?;
                return Ok(vec![]);
            }
            Event::Error { kind } => {
                self.metrics.error_count += 1;
                self.transcript_slot = None;
                self.tts_stream_handle = None;
                self.transition(Error, &event, Some(serde_json::json!({ "kind": kind })))?;
                return Ok(vec![]);
            }
            Event::End => {
                self.transition(Ended, &event, None)?;
                return Ok(vec![]);
            }
        }
    }

    fn begin_interrupt(&mut self, event: &Event) -> Result<Vec<Effect>, FsmError> {
        let pre = self.state;
        self.pre_interrupt_state = Some(pre);
        self.metrics.interrupt_count += 1;
        self.transition(
            ConversationState::Interrupted,
            event,
            Some(serde_json::json!({ "pre_interrupt_state": pre })),
        )?;
        let handle = self.tts_stream_handle.clone().unwrap_or_default();
        Ok(vec![
            Effect::StopSynthesis { stream_handle: handle },
            Effect::StopPlayback,
        ])
    }

    /// Called by the session's 200ms interrupt-dwell timer. No-op if the
    /// state has already moved on (e.g. an explicit `end` arrived first).
    pub fn interrupt_dwell_elapsed(&mut self) -> Result<(), FsmError> {
        if self.state == ConversationState::Interrupted {
            self.transition(ConversationState::Listening, &Event::VadEnded, None)?;
        }
        Ok(())
    }

    /// Called by the session's 2s error-auto-recover timer.
    pub fn error_recovery_elapsed(&mut self) -> Result<(), FsmError> {
        if self.state == ConversationState::Error {
            self.transition(ConversationState::Idle, &Event::End, None)?;
        }
        Ok(())
    }

    fn complete_turn(&mut self) {
        let started_at = self.pending_turn.started_at.unwrap_or_else(Utc::now);
        let latency_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        let audio_duration_ms = self.pending_turn.audio_duration_ms;
        let turn = Turn {
            turn_id: Uuid::new_v4(),
            user_text: self.pending_turn.user_text.clone().unwrap_or_default(),
            assistant_text: self.pending_turn.assistant_text.clone().unwrap_or_default(),
            citations: self.pending_turn.citations.clone(),
            audio_duration_ms,
            latency_ms,
            completed_at: Utc::now(),
        };
        self.metrics.record_turn_latency(latency_ms);
        self.metrics.cumulative_duration_ms += audio_duration_ms;
        self.history.push(turn);
        self.pending_turn = PendingTurn::default();
        self.transcript_slot = None;
        self.tts_stream_handle = None;
    }

    /// Tail of history for the reasoning call: at most the last 5 turns,
    /// alternating user/assistant (§4.3).
    pub fn reasoning_context(&self, new_user_text: &str) -> Vec<(&'static str, String)> {
        let mut messages = Vec::new();
        for turn in self.history.iter().rev().take(5).rev() {
            messages.push(("user", turn.user_text.clone()));
            messages.push(("assistant", turn.assistant_text.clone()));
        }
        messages.push(("user", new_user_text.to_string()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_table_matches_spec() {
        use ConversationState::*;
        assert!(Idle.can_transition_to(Listening));
        assert!(!Idle.can_transition_to(Transcribing));
        assert!(Speaking.can_transition_to(Interrupted));
        assert!(!Ended.can_transition_to(Idle));
    }

    #[test]
    fn happy_path_sequence() {
        let mut fsm = Fsm::new();
        fsm.handle(Event::VadStarted).unwrap();
        assert_eq!(fsm.state(), ConversationState::Listening);
        fsm.push_audio_frame(&AudioFrame::new(
            vec![0.1; 160],
            crate::audio::SampleRate::Hz16000,
            crate::audio::Channels::Mono,
            0,
        ));
        fsm.handle(Event::VadEnded).unwrap();
        assert_eq!(fsm.state(), ConversationState::Transcribing);
        fsm.handle(Event::TranscriptionFinal { text: "hello".into() }).unwrap();
        assert_eq!(fsm.state(), ConversationState::Interpreting);
        fsm.handle(Event::LlmResponseComplete {
            response: "hi there".into(),
            citations: vec![],
        })
        .unwrap();
        assert_eq!(fsm.state(), ConversationState::Answering);
        fsm.handle(Event::TtsStarted { stream_handle: "h1".into(), audio_duration_ms: 1250 }).unwrap();
        assert_eq!(fsm.state(), ConversationState::Speaking);
        assert_eq!(fsm.tts_stream_handle.as_deref(), Some("h1"));
        fsm.handle(Event::TtsComplete).unwrap();
        assert_eq!(fsm.state(), ConversationState::Idle);
        assert_eq!(fsm.metrics.total_turns, 1);
        assert_eq!(fsm.history.len(), 1);
        assert_eq!(fsm.history[0].user_text, "hello");
        assert_eq!(fsm.history[0].assistant_text, "hi there");
        assert_eq!(fsm.history[0].audio_duration_ms, 1250);
        assert_eq!(fsm.metrics.cumulative_duration_ms, 1250);
        assert!(fsm.tts_stream_handle.is_none());
    }

    #[test]
    fn empty_transcription_returns_to_listening() {
        let mut fsm = Fsm::new();
        fsm.handle(Event::VadStarted).unwrap();
        fsm.push_audio_frame(&AudioFrame::new(
            vec![0.0; 160],
            crate::audio::SampleRate::Hz16000,
            crate::audio::Channels::Mono,
            0,
        ));
        fsm.handle(Event::VadEnded).unwrap();
        fsm.handle(Event::TranscriptionFinal { text: "   ".into() }).unwrap();
        assert_eq!(fsm.state(), ConversationState::Listening);
        assert_eq!(fsm.metrics.total_turns, 0);
    }

    #[test]
    fn barge_in_during_speaking() {
        let mut fsm = Fsm::new();
        fsm.handle(Event::VadStarted).unwrap();
        fsm.push_audio_frame(&AudioFrame::new(
            vec![0.1; 160],
            crate::audio::SampleRate::Hz16000,
            crate::audio::Channels::Mono,
            0,
        ));
        fsm.handle(Event::VadEnded).unwrap();
        fsm.handle(Event::TranscriptionFinal { text: "hello".into() }).unwrap();
        fsm.handle(Event::LlmResponseComplete {
            response: "hi".into(),
            citations: vec![],
        })
        .unwrap();
        fsm.handle(Event::TtsStarted { stream_handle: "h1".into(), audio_duration_ms: 500 }).unwrap();
        let effects = fsm.handle(Event::UserInterrupt).unwrap();
        assert_eq!(fsm.state(), ConversationState::Interrupted);
        assert_eq!(fsm.metrics.interrupt_count, 1);
        assert!(matches!(effects[0], Effect::StopSynthesis { .. }));
        assert!(matches!(effects[1], Effect::StopPlayback));
        fsm.interrupt_dwell_elapsed().unwrap();
        assert_eq!(fsm.state(), ConversationState::Listening);
    }

    #[test]
    fn two_rapid_interrupts_produce_one_transition() {
        let mut fsm = Fsm::new();
        fsm.handle(Event::VadStarted).unwrap();
        fsm.push_audio_frame(&AudioFrame::new(
            vec![0.1; 160],
            crate::audio::SampleRate::Hz16000,
            crate::audio::Channels::Mono,
            0,
        ));
        fsm.handle(Event::VadEnded).unwrap();
        fsm.handle(Event::TranscriptionFinal { text: "hello".into() }).unwrap();
        fsm.handle(Event::LlmResponseComplete {
            response: "hi".into(),
            citations: vec![],
        })
        .unwrap();
        fsm.handle(Event::TtsStarted { stream_handle: "h1".into(), audio_duration_ms: 500 }).unwrap();
        fsm.handle(Event::UserInterrupt).unwrap();
        // Second interrupt arrives while already INTERRUPTED: no-op, not a
        // second transition into INTERRUPTED.
        let result = fsm.handle(Event::UserInterrupt);
        assert!(result.is_ok());
        let interrupt_transitions = fsm
            .state_history
            .iter()
            .filter(|t| t.to == ConversationState::Interrupted)
            .count();
        assert_eq!(interrupt_transitions, 1);
        assert_eq!(fsm.metrics.interrupt_count, 1);
    }

    #[test]
    fn transcription_failure_auto_recovers() {
        let mut fsm = Fsm::new();
        fsm.handle(Event::VadStarted).unwrap();
        fsm.push_audio_frame(&AudioFrame::new(
            vec![0.1; 160],
            crate::audio::SampleRate::Hz16000,
            crate::audio::Channels::Mono,
            0,
        ));
        fsm.handle(Event::VadEnded).unwrap();
        fsm.handle(Event::Error { kind: ErrorKind::TranscriptionFailed }).unwrap();
        assert_eq!(fsm.state(), ConversationState::Error);
        assert_eq!(fsm.metrics.error_count, 1);
        fsm.error_recovery_elapsed().unwrap();
        assert_eq!(fsm.state(), ConversationState::Idle);
    }

    #[test]
    fn illegal_transition_is_idempotent_on_state() {
        let mut fsm = Fsm::new();
        let before = fsm.state();
        let result = fsm.handle(Event::TranscriptionFinal { text: "x".into() });
        assert!(result.is_ok());
        assert_eq!(fsm.state(), before);
    }
}
