//! Energy-based voice activity detection.
//!
//! A single engine, not a pluggable trait over multiple ML backends: the
//! conversation engine only ever needs speech-start/speech-end edges, and
//! the cost of a wrong edge (a missed interrupt, a turn that never closes)
//! is better addressed by getting the RMS threshold right than by swapping
//! models.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use voice_agent_core::AudioFrame;

/// Events the VAD emits toward the FSM. The FSM interprets these; the VAD
/// never mutates session state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStarted,
    SpeechEnded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadConfig {
    pub threshold: f32,
    pub silence_window_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            silence_window_ms: 1000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VadError {
    #[error("frame length not divisible by 2")]
    MisalignedFrame,
}

/// Consolidates the VAD's mutable state behind a single lock rather than
/// several independently-locked fields, avoiding lock-ordering hazards on
/// the per-frame hot path.
struct MutableState {
    speaking: bool,
    silence_deadline: Option<Instant>,
}

pub struct EnergyVad {
    config: VadConfig,
    state: Mutex<MutableState>,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MutableState {
                speaking: false,
                silence_deadline: None,
            }),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state.lock().speaking
    }

    /// Root-mean-square energy of normalized PCM samples, matching
    /// energy(frame) = sqrt(mean((sample_i/32768)^2)).
    pub fn energy(frame: &AudioFrame) -> f32 {
        if frame.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = frame.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / frame.samples.len() as f64).sqrt() as f32
    }

    /// Process one frame and return the event it caused, if any. An empty
    /// `samples` slice is a silent no-op, matching the "empty frame
    /// ignored" edge case; malformed byte-level frames are rejected
    /// earlier by [`validate_frame_bytes`], before an `AudioFrame` exists.
    pub fn process(&self, frame: &AudioFrame) -> Option<VadEvent> {
        if frame.samples.is_empty() {
            return None;
        }

        let energy = Self::energy(frame);
        let mut state = self.state.lock();

        if energy > self.config.threshold {
            state.silence_deadline = None;
            if !state.speaking {
                state.speaking = true;
                return Some(VadEvent::SpeechStarted);
            }
            return None;
        }

        if state.speaking && state.silence_deadline.is_none() {
            state.silence_deadline =
                Some(Instant::now() + Duration::from_millis(self.config.silence_window_ms));
            return None;
        }

        if let Some(deadline) = state.silence_deadline {
            if Instant::now() >= deadline {
                state.speaking = false;
                state.silence_deadline = None;
                return Some(VadEvent::SpeechEnded);
            }
        }

        None
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.speaking = false;
        state.silence_deadline = None;
    }
}

/// Validates the inbound frame length rule (§4.2 bad_frame): PCM16 byte
/// payloads must have an even length.
pub fn validate_frame_bytes(bytes: &[u8]) -> Result<(), VadError> {
    if bytes.len() % 2 != 0 {
        return Err(VadError::MisalignedFrame);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::{Channels, SampleRate};

    fn frame(amplitude: f32) -> AudioFrame {
        AudioFrame::new(vec![amplitude; 320], SampleRate::Hz16000, Channels::Mono, 0)
    }

    #[test]
    fn silence_does_not_trigger_speech() {
        let vad = EnergyVad::new(VadConfig::default());
        assert_eq!(vad.process(&frame(0.0)), None);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn loud_frame_triggers_speech_started() {
        let vad = EnergyVad::new(VadConfig::default());
        assert_eq!(vad.process(&frame(0.5)), Some(VadEvent::SpeechStarted));
        assert!(vad.is_speaking());
        // A second loud frame doesn't re-fire the edge.
        assert_eq!(vad.process(&frame(0.5)), None);
    }

    #[test]
    fn threshold_exactly_equal_is_below_threshold() {
        let vad = EnergyVad::new(VadConfig { threshold: 0.02, silence_window_ms: 1000 });
        let f = frame(0.02);
        assert!((EnergyVad::energy(&f) - 0.02).abs() < 1e-6);
        assert_eq!(vad.process(&f), None);
    }

    #[test]
    fn empty_frame_is_ignored() {
        let vad = EnergyVad::new(VadConfig::default());
        let f = AudioFrame::new(vec![], SampleRate::Hz16000, Channels::Mono, 0);
        assert_eq!(vad.process(&f), None);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn odd_length_byte_frame_rejected() {
        assert!(validate_frame_bytes(&[1, 2, 3]).is_err());
        assert!(validate_frame_bytes(&[1, 2, 3, 4]).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_window_elapses_into_speech_ended() {
        let vad = EnergyVad::new(VadConfig { threshold: 0.01, silence_window_ms: 1000 });
        vad.process(&frame(0.5));
        assert!(vad.is_speaking());
        // advance past the silence window: the next sub-threshold frame
        // observes the elapsed deadline and fires the edge.
        tokio::time::advance(Duration::from_millis(1100)).await;
        let event = vad.process(&frame(0.0));
        assert_eq!(event, Some(VadEvent::SpeechEnded));
        assert!(!vad.is_speaking());
    }
}
