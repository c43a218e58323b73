//! WebSocket transport: one duplex connection per session (§4.4).
//!
//! Inbound text frames are classified as control frames; inbound binary
//! frames are always audio. Outbound, the orchestrator's broadcast stream
//! is translated into the same two frame kinds and written back.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncMutex;

use voice_agent_core::{AudioFrame, Channels, Event, SampleRate};
use voice_agent_pipeline::{validate_frame_bytes, EnergyVad, OrchestratorEvent, VadConfig, VadEvent};
use voice_agent_transport::framing::{classify_inbound, encode_audio_frame, InboundControl, InboundFrame, OutboundControl};

use crate::rate_limit::RateLimiter;
use crate::session::Session;
use crate::state::AppState;

type Sender = Arc<AsyncMutex<SplitSink<WebSocket, Message>>>;

pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Unknown session ids complete the WS handshake and are then closed
    /// with a policy-violation code (§4.4 point 1) rather than rejected at
    /// the HTTP layer, matching the transport-level framing the rest of
    /// the connection lifecycle uses.
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        Path(session_id): Path<String>,
    ) -> Response {
        let session = state.sessions.get(&session_id);
        if session.is_some() {
            state.sessions.cancel_pending_delete(&session_id);
        }
        ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state))
    }

    async fn handle_socket(socket: WebSocket, session: Option<Arc<Session>>, state: AppState) {
        let Some(session) = session else {
            let (mut sink, _) = socket.split();
            let frame = CloseFrame { code: close_code::POLICY, reason: "unknown session".into() };
            let _ = sink.send(Message::Close(Some(frame))).await;
            return;
        };

        let rate_limit_config = state.get_config().server.rate_limit.clone();
        let session_config = session.orchestrator.config();
        let vad_config =
            VadConfig { threshold: session_config.vad_threshold, silence_window_ms: session_config.vad_silence_window_ms };
        let rate_limiter = RateLimiter::new(&rate_limit_config);
        let vad = EnergyVad::new(vad_config);

        let (sink, mut stream) = socket.split();
        let sender: Sender = Arc::new(AsyncMutex::new(sink));

        if let Ok(text) = OutboundControl::Ready.to_text() {
            let _ = sender.lock().await.send(Message::Text(text)).await;
        }

        let mut events = session.orchestrator.subscribe();
        let forward_sender = Arc::clone(&sender);
        let forward_task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                if !forward_orchestrator_event(&forward_sender, event).await {
                    break;
                }
            }
        });

        let mut sequence: u64 = 0;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    session.touch();
                    if rate_limiter.check_audio(bytes.len()).is_err() {
                        tracing::warn!(session_id = %session.id, "audio rate limit exceeded, dropping frame");
                        continue;
                    }
                    if validate_frame_bytes(&bytes).is_err() {
                        tracing::debug!(session_id = %session.id, "dropping malformed audio frame");
                        continue;
                    }
                    sequence += 1;
                    let frame = AudioFrame::from_pcm16(&bytes, SampleRate::Hz16000, Channels::Mono, sequence);

                    let dropped_before = session.orchestrator.metrics().backpressure_drop_count;
                    session.orchestrator.push_audio_frame(&frame);
                    let dropped_after = session.orchestrator.metrics().backpressure_drop_count;
                    if dropped_after > dropped_before {
                        crate::metrics::record_backpressure_drop(dropped_after - dropped_before);
                    }

                    match vad.process(&frame) {
                        Some(VadEvent::SpeechStarted) => session.orchestrator.on_event(Event::VadStarted),
                        Some(VadEvent::SpeechEnded) => session.orchestrator.on_event(Event::VadEnded),
                        None => {}
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    session.touch();
                    if rate_limiter.check_message().is_err() {
                        tracing::warn!(session_id = %session.id, "message rate limit exceeded");
                        continue;
                    }
                    handle_control_frame(&session, &sender, text.as_bytes()).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    tracing::warn!(session_id = %session.id, error = %err, "websocket receive error");
                    break;
                }
            }
        }

        forward_task.abort();
        state.sessions.schedule_delete(session.id.clone());
        tracing::info!(session_id = %session.id, "transport disconnected, grace window started");
    }
}

async fn handle_control_frame(session: &Arc<Session>, sender: &Sender, payload: &[u8]) {
    let control = match classify_inbound(payload) {
        InboundFrame::Control(control) => control,
        InboundFrame::Audio(_) => {
            tracing::debug!(session_id = %session.id, "text frame did not parse as a control message");
            return;
        }
    };

    match control {
        InboundControl::Offer(_) | InboundControl::IceCandidate(_) => {
            // Media negotiation itself is out of scope; the core answers
            // synthetically so state flow isn't blocked on a collaborator
            // that isn't part of this system (§4.4).
            let answer = OutboundControl::Answer { sdp: serde_json::json!({"type": "answer"}) };
            if let Ok(text) = answer.to_text() {
                let _ = sender.lock().await.send(Message::Text(text)).await;
            }
        }
        InboundControl::StartRecording | InboundControl::StopRecording => {
            tracing::debug!(session_id = %session.id, "advisory recording signal received");
        }
        InboundControl::Interrupt => {
            session.orchestrator.on_event(Event::UserInterrupt);
        }
    }
}

/// Translates one orchestrator event into the outbound wire frame(s), if
/// any. Returns `false` when the connection should close.
async fn forward_orchestrator_event(sender: &Sender, event: OrchestratorEvent) -> bool {
    match event {
        OrchestratorEvent::StateChanged { transition } => {
            let control = OutboundControl::StateChange {
                state: transition.to.to_string(),
                transition: serde_json::to_value(&transition).unwrap_or(serde_json::Value::Null),
                timestamp: transition.at.timestamp_millis(),
            };
            send_control(sender, control).await
        }
        OrchestratorEvent::ThinkingStarted => {
            send_control(sender, OutboundControl::LlmThinking { timestamp: chrono::Utc::now().timestamp_millis() }).await
        }
        OrchestratorEvent::StopPlayback => {
            send_control(sender, OutboundControl::StopTts { timestamp: chrono::Utc::now().timestamp_millis() }).await
        }
        OrchestratorEvent::SynthesisAudio(audio) => {
            let timestamp_ms = chrono::Utc::now().timestamp_millis();
            match encode_audio_frame(&audio, true, timestamp_ms) {
                Ok(frame) => sender.lock().await.send(Message::Binary(frame.to_vec())).await.is_ok(),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to encode outbound audio frame");
                    true
                }
            }
        }
        OrchestratorEvent::Error { kind } => {
            let control = OutboundControl::Error { kind: kind.to_string(), message: kind.to_string() };
            send_control(sender, control).await
        }
        OrchestratorEvent::Ended => {
            let frame = CloseFrame { code: close_code::NORMAL, reason: "session ended".into() };
            let _ = sender.lock().await.send(Message::Close(Some(frame))).await;
            false
        }
        OrchestratorEvent::TranscriptFinal(_)
        | OrchestratorEvent::ReasoningComplete { .. }
        | OrchestratorEvent::SynthesisStarted
        | OrchestratorEvent::TurnComplete(_) => true,
    }
}

async fn send_control(sender: &Sender, control: OutboundControl) -> bool {
    match control.to_text() {
        Ok(text) => sender.lock().await.send(Message::Text(text)).await.is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode outbound control frame");
            true
        }
    }
}
