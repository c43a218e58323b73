//! Turn orchestrator: sequences transcribe -> reason -> synthesize for a
//! single session, feeding results back into the session's [`Fsm`] and
//! broadcasting progress to whatever is driving the transport (§4.3).
//!
//! Each turn runs as its own spawned task carrying a fresh
//! [`CancellationToken`]. A barge-in (`VadStarted`/`UserInterrupt` while
//! `Answering`/`Speaking`) cancels that token; the in-flight service call
//! unwinds as `ServicesError::Cancelled`, which is absorbed without
//! raising an `error` event.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use voice_agent_core::{AudioFrame, ConversationState, ErrorKind, Event, Fsm, SessionConfig, Transition, Turn};
use voice_agent_services::{build_messages, ServiceClients, ServiceKind, ServicesError};

/// Events the orchestrator emits as a turn progresses. The transport layer
/// forwards these to the client; the sink persists `TurnComplete`.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    StateChanged { transition: Transition },
    TranscriptFinal(String),
    ThinkingStarted,
    ReasoningComplete { response: String, citations: Vec<serde_json::Value> },
    SynthesisStarted,
    SynthesisAudio(Arc<[u8]>),
    TurnComplete(Turn),
    Error { kind: ErrorKind },
    StopPlayback,
    Ended,
}

/// The identity fields the reasoning call needs attached to every request
/// (§6).
#[derive(Debug, Clone)]
pub struct TurnIdentity {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
}

/// Drives one session's conversation: owns its [`Fsm`], dispatches events
/// into it, and spawns the transcribe/reason/synthesize chain whenever a
/// turn begins.
pub struct Orchestrator {
    fsm: Mutex<Fsm>,
    services: ServiceClients,
    identity: TurnIdentity,
    config: RwLock<SessionConfig>,
    event_tx: broadcast::Sender<OrchestratorEvent>,
    turn_token: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        services: ServiceClients,
        identity: TurnIdentity,
        config: SessionConfig,
    ) -> (Arc<Self>, broadcast::Receiver<OrchestratorEvent>) {
        let (event_tx, event_rx) = broadcast::channel(256);
        let orchestrator = Arc::new(Self {
            fsm: Mutex::new(Fsm::new()),
            services,
            identity,
            config: RwLock::new(config),
            event_tx,
            turn_token: Mutex::new(None),
        });
        (orchestrator, event_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> ConversationState {
        self.fsm.lock().state()
    }

    pub fn history(&self) -> Vec<Turn> {
        self.fsm.lock().history.clone()
    }

    pub fn metrics(&self) -> voice_agent_core::Metrics {
        self.fsm.lock().metrics.clone()
    }

    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: SessionConfig) {
        *self.config.write() = config;
    }

    pub fn identity(&self) -> &TurnIdentity {
        &self.identity
    }

    pub fn push_audio_frame(&self, frame: &AudioFrame) {
        self.fsm.lock().push_audio_frame(frame);
    }

    /// Feed a non-turn-starting event (VAD transitions, explicit
    /// interrupt, session end) into the FSM and act on the result.
    pub fn on_event(self: &Arc<Self>, event: Event) {
        let (_before, after, effects) = self.apply(event.clone());
        if !effects.is_empty() {
            if let Some(token) = self.turn_token.lock().take() {
                token.cancel();
            }
        }
        if effects.iter().any(|effect| matches!(effect, voice_agent_core::Effect::StopPlayback)) {
            let _ = self.event_tx.send(OrchestratorEvent::StopPlayback);
        }
        if after == ConversationState::Ended {
            let _ = self.event_tx.send(OrchestratorEvent::Ended);
        }
        if after == ConversationState::Interrupted {
            self.spawn_interrupt_dwell_timer();
        }
        if matches!(event, Event::VadEnded) && after == ConversationState::Transcribing {
            self.spawn_turn();
        }
    }

    /// INTERRUPTED is a dwell state, not a resting one (§4.1 step 4): 200ms
    /// after entry, unless something else has already moved the FSM on,
    /// it auto-advances back to LISTENING.
    fn spawn_interrupt_dwell_timer(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            let transition = {
                let mut fsm = this.fsm.lock();
                fsm.interrupt_dwell_elapsed().ok();
                fsm.state_history.last().cloned()
            };
            if let Some(transition) = transition {
                if transition.to == ConversationState::Listening {
                    let _ = this.event_tx.send(OrchestratorEvent::StateChanged { transition });
                }
            }
        });
    }

    /// ERROR auto-recovers to IDLE 2s after entry (§4.1, §7), unless the
    /// session has already moved on (e.g. an explicit `end` landed first).
    fn spawn_error_recovery_timer(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            let transition = {
                let mut fsm = this.fsm.lock();
                fsm.error_recovery_elapsed().ok();
                fsm.state_history.last().cloned()
            };
            if let Some(transition) = transition {
                if transition.to == ConversationState::Idle {
                    let _ = this.event_tx.send(OrchestratorEvent::StateChanged { transition });
                }
            }
        });
    }

    /// Apply one event to the fsm and broadcast the resulting transition, if
    /// any, to subscribers (the transport and the sink).
    fn apply(
        self: &Arc<Self>,
        event: Event,
    ) -> (ConversationState, ConversationState, Vec<voice_agent_core::Effect>) {
        let mut fsm = self.fsm.lock();
        let before = fsm.state();
        let effects = fsm.handle(event).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "fsm rejected event");
            Vec::new()
        });
        let after = fsm.state();
        let transition = if before != after { fsm.state_history.last().cloned() } else { None };
        drop(fsm);
        if let Some(transition) = transition {
            let _ = self.event_tx.send(OrchestratorEvent::StateChanged { transition });
        }
        (before, after, effects)
    }

    fn spawn_turn(self: &Arc<Self>) {
        let token = CancellationToken::new();
        *self.turn_token.lock() = Some(token.clone());
        let pcm16 = self.fsm.lock().audio_buffer.to_pcm16();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_turn(pcm16, token).await;
        });
    }

    async fn run_turn(self: Arc<Self>, pcm16: Vec<u8>, token: CancellationToken) {
        let transcript = match self.services.transcribe.transcribe(pcm16, &token).await {
            Ok(response) => response.text,
            Err(err) => return self.fail(ServiceKind::Transcribe, err),
        };

        let (_, after, _) = self.apply(Event::TranscriptionFinal { text: transcript.clone() });
        let _ = self.event_tx.send(OrchestratorEvent::TranscriptFinal(transcript.clone()));
        if after != ConversationState::Interpreting {
            // Empty transcript routed back to Listening, or a barge-in
            // landed while transcription was in flight. Either way there
            // is no turn left to continue.
            self.turn_token.lock().take();
            return;
        }
        let _ = self.event_tx.send(OrchestratorEvent::ThinkingStarted);

        let history_tail = self.fsm.lock().reasoning_context(&transcript);
        let messages = build_messages(&history_tail);
        let reasoned = match self
            .services
            .reason
            .reason(&messages, &self.identity.tenant_id, &self.identity.user_id, &self.identity.session_id, &token)
            .await
        {
            Ok(response) => response,
            Err(err) => return self.fail(ServiceKind::Reason, err),
        };

        let (_, after, _) = self.apply(Event::LlmResponseComplete {
            response: reasoned.response.clone(),
            citations: reasoned.citations.clone(),
        });
        let _ = self.event_tx.send(OrchestratorEvent::ReasoningComplete {
            response: reasoned.response.clone(),
            citations: reasoned.citations.clone(),
        });
        if after != ConversationState::Answering {
            // Tie-break: an interrupt landed between the reasoning call
            // completing and the FSM accepting it. The response is
            // discarded rather than spoken.
            self.turn_token.lock().take();
            return;
        }
        let _ = self.event_tx.send(OrchestratorEvent::SynthesisStarted);

        let config_snapshot = self.config.read().clone();
        let audio = match self.services.synthesize.synthesize(&reasoned.response, &config_snapshot, &token).await {
            Ok(bytes) => bytes,
            Err(err) => return self.fail(ServiceKind::Synthesize, err),
        };

        let stream_handle = Uuid::new_v4().to_string();
        // Synthesized audio is 16-bit mono PCM at 16kHz, matching the rest
        // of the pipeline's wire assumption (websocket.rs inbound frames).
        let audio_duration_ms = (audio.len() as u64 * 1000) / (voice_agent_core::SampleRate::Hz16000.as_u32() as u64 * 2);
        let (_, after, _) = self.apply(Event::TtsStarted { stream_handle, audio_duration_ms });
        if after != ConversationState::Speaking {
            self.turn_token.lock().take();
            return;
        }
        let _ = self.event_tx.send(OrchestratorEvent::SynthesisAudio(Arc::from(audio.into_boxed_slice())));

        // A single audio frame is synthesized per turn (no incremental
        // playback progress to wait on), so completion follows immediately.
        let (_, after, _) = self.apply(Event::TtsComplete);
        if after == ConversationState::Idle {
            if let Some(turn) = self.fsm.lock().history.last().cloned() {
                let _ = self.event_tx.send(OrchestratorEvent::TurnComplete(turn));
            }
        }
        self.turn_token.lock().take();
    }

    fn fail(self: &Arc<Self>, kind: ServiceKind, err: ServicesError) {
        if let Some(fsm_kind) = err.fsm_kind(kind) {
            let (_, after, _) = self.apply(Event::Error { kind: fsm_kind });
            let _ = self.event_tx.send(OrchestratorEvent::Error { kind: fsm_kind });
            if after == ConversationState::Error {
                self.spawn_error_recovery_timer();
            }
        }
        self.turn_token.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::{Channels, SampleRate};

    fn identity() -> TurnIdentity {
        TurnIdentity {
            session_id: "s1".into(),
            tenant_id: "t1".into(),
            user_id: "u1".into(),
        }
    }

    fn services() -> ServiceClients {
        let http = reqwest::Client::new();
        ServiceClients::new(
            http,
            voice_agent_services::Endpoints {
                transcribe: "http://127.0.0.1:0/transcribe".into(),
                reason: "http://127.0.0.1:0/reason".into(),
                synthesize: "http://127.0.0.1:0/synthesize".into(),
            },
        )
    }

    #[tokio::test]
    async fn vad_ended_with_no_buffered_audio_returns_to_idle() {
        let (orchestrator, _rx) = Orchestrator::new(services(), identity(), SessionConfig::default());
        orchestrator.on_event(Event::UserAudio);
        assert_eq!(orchestrator.state(), ConversationState::Listening);
        orchestrator.on_event(Event::VadEnded);
        assert_eq!(orchestrator.state(), ConversationState::Idle);
    }

    #[tokio::test]
    async fn vad_ended_with_buffered_audio_enters_transcribing_and_spawns_turn() {
        let (orchestrator, mut rx) = Orchestrator::new(services(), identity(), SessionConfig::default());
        orchestrator.on_event(Event::UserAudio);
        orchestrator.push_audio_frame(&AudioFrame::new(vec![0.5; 160], SampleRate::Hz16000, Channels::Mono, 0));
        orchestrator.on_event(Event::VadEnded);
        assert_eq!(orchestrator.state(), ConversationState::Transcribing);
        // The spawned turn will fail fast against the unreachable endpoint
        // and emit an Error event rather than hang.
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await;
        assert!(event.is_ok());
    }

    #[tokio::test]
    async fn barge_in_cancels_in_flight_turn() {
        let (orchestrator, _rx) = Orchestrator::new(services(), identity(), SessionConfig::default());
        orchestrator.on_event(Event::UserAudio);
        orchestrator.push_audio_frame(&AudioFrame::new(vec![0.5; 160], SampleRate::Hz16000, Channels::Mono, 0));
        orchestrator.on_event(Event::VadEnded);
        assert!(orchestrator.turn_token.lock().is_some());
        // Force into Answering/Speaking artificially isn't possible from
        // outside; the cancellation path itself is covered by the fsm's
        // own begin_interrupt tests. Here we just confirm VadStarted while
        // Transcribing is a no-op per the legal transition table.
        orchestrator.on_event(Event::VadStarted);
        assert_eq!(orchestrator.state(), ConversationState::Transcribing);
    }
}
