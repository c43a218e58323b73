//! Inbound/outbound wire framing for a session's duplex connection (§4.4).
//!
//! Framing is tagged at the sender, not inferred by the receiver trying to
//! parse bytes as JSON and falling back to binary: a `ControlFrame`
//! serializes to JSON text, an `OutboundAudio` frame serializes to a JSON
//! header line followed immediately by the raw audio bytes in the same
//! delivery.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A frame received from the client. Classification happens once, at the
/// transport boundary: valid JSON with a `type` field is a control frame,
/// anything else is raw audio.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Control(InboundControl),
    Audio(Bytes),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundControl {
    Offer(serde_json::Value),
    IceCandidate(serde_json::Value),
    StartRecording,
    StopRecording,
    Interrupt,
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("payload is neither valid control JSON nor usable audio")]
    Malformed,
}

/// Classifies a raw inbound payload per §4.4's rule: JSON-with-a-`type`-
/// field is control, everything else is audio.
pub fn classify_inbound(payload: &[u8]) -> InboundFrame {
    if let Ok(control) = serde_json::from_slice::<InboundControl>(payload) {
        return InboundFrame::Control(control);
    }
    InboundFrame::Audio(Bytes::copy_from_slice(payload))
}

/// Outbound control messages, sent as JSON text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundControl {
    Ready,
    StateChange { state: String, transition: serde_json::Value, timestamp: i64 },
    LlmThinking { timestamp: i64 },
    #[serde(rename = "stop-tts")]
    StopTts { timestamp: i64 },
    Answer { sdp: serde_json::Value },
    Error { kind: String, message: String },
}

impl OutboundControl {
    pub fn to_text(&self) -> Result<String, FramingError> {
        serde_json::to_string(self).map_err(|_| FramingError::Malformed)
    }
}

/// An outbound audio delivery: a JSON header line (with a trailing
/// newline) concatenated with raw audio bytes, sent as a single binary
/// message (§4.4).
#[derive(Debug, Clone, Serialize)]
struct AudioHeader {
    #[serde(rename = "type")]
    kind: &'static str,
    is_final: bool,
    timestamp: i64,
}

pub fn encode_audio_frame(audio: &[u8], is_final: bool, timestamp_ms: i64) -> Result<Bytes, FramingError> {
    let header = AudioHeader { kind: "audio", is_final, timestamp: timestamp_ms };
    let mut line = serde_json::to_vec(&header).map_err(|_| FramingError::Malformed)?;
    line.push(b'\n');
    line.extend_from_slice(audio);
    Ok(Bytes::from(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_control_frame_classified() {
        let payload = br#"{"type":"interrupt"}"#;
        match classify_inbound(payload) {
            InboundFrame::Control(InboundControl::Interrupt) => {}
            other => panic!("expected Interrupt, got {other:?}"),
        }
    }

    #[test]
    fn raw_bytes_classified_as_audio() {
        let payload = [0u8, 1, 2, 3, 255];
        match classify_inbound(&payload) {
            InboundFrame::Audio(bytes) => assert_eq!(bytes.as_ref(), &payload),
            other => panic!("expected Audio, got {other:?}"),
        }
    }

    #[test]
    fn json_without_type_field_falls_back_to_audio() {
        let payload = br#"{"foo":"bar"}"#;
        match classify_inbound(payload) {
            InboundFrame::Audio(_) => {}
            other => panic!("expected Audio fallback, got {other:?}"),
        }
    }

    #[test]
    fn encoded_audio_frame_has_newline_separated_header() {
        #[derive(Deserialize)]
        struct DecodedHeader {
            #[serde(rename = "type")]
            kind: String,
            is_final: bool,
            timestamp: i64,
        }

        let frame = encode_audio_frame(&[1, 2, 3], true, 42).unwrap();
        let newline = frame.iter().position(|&b| b == b'\n').expect("header newline");
        let header: DecodedHeader = serde_json::from_slice(&frame[..newline]).unwrap();
        assert_eq!(header.kind, "audio");
        assert!(header.is_final);
        assert_eq!(header.timestamp, 42);
        assert_eq!(&frame[newline + 1..], &[1, 2, 3]);
    }

    #[test]
    fn ready_control_serializes_as_tagged_json() {
        let text = OutboundControl::Ready.to_text().unwrap();
        assert_eq!(text, r#"{"type":"ready"}"#);
    }

    #[test]
    fn stop_tts_control_uses_hyphenated_tag_and_carries_timestamp() {
        let text = OutboundControl::StopTts { timestamp: 1000 }.to_text().unwrap();
        assert_eq!(text, r#"{"type":"stop-tts","timestamp":1000}"#);
    }

    #[test]
    fn state_change_control_carries_state_transition_and_timestamp() {
        let text = OutboundControl::StateChange {
            state: "listening".into(),
            transition: serde_json::json!({"from": "idle", "to": "listening"}),
            timestamp: 1234,
        }
        .to_text()
        .unwrap();
        assert!(text.contains(r#""state":"listening""#));
        assert!(text.contains(r#""timestamp":1234"#));
    }
}
