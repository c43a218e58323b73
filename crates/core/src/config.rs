//! Session-scoped voice/prosody configuration (§3 Session.config, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Default for Voice {
    fn default() -> Self {
        Self::Alloy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Friendly,
    Professional,
    Formal,
    Casual,
}

impl Default for Tone {
    fn default() -> Self {
        Self::Professional
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    Slow,
    Normal,
    Fast,
}

impl Default for Pace {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Energy {
    Low,
    Medium,
    High,
}

impl Default for Energy {
    fn default() -> Self {
        Self::Medium
    }
}

fn default_vad_threshold() -> f32 {
    0.01
}

fn default_vad_silence_window_ms() -> u64 {
    1000
}

fn default_vad_sensitivity() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

/// Per-session voice and VAD configuration, set at creation (§6 ControlSurface
/// `create` request) and carried for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub voice: Voice,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub pace: Pace,
    #[serde(default)]
    pub energy: Energy,
    #[serde(default)]
    pub prosody: serde_json::Value,
    #[serde(default = "default_true")]
    pub enable_breaths: bool,
    #[serde(default = "default_true")]
    pub enable_ssml: bool,
    #[serde(default = "default_vad_sensitivity")]
    pub vad_sensitivity: f32,
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    #[serde(default = "default_vad_silence_window_ms")]
    pub vad_silence_window_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            tone: Tone::default(),
            pace: Pace::default(),
            energy: Energy::default(),
            prosody: serde_json::Value::Null,
            enable_breaths: true,
            enable_ssml: true,
            vad_sensitivity: default_vad_sensitivity(),
            vad_threshold: default_vad_threshold(),
            vad_silence_window_ms: default_vad_silence_window_ms(),
        }
    }
}

/// Request fields accepted by ControlSurface `create` (§6). All optional;
/// defaults fill in via [`SessionConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub voice: Option<Voice>,
    pub tone: Option<Tone>,
    pub pace: Option<Pace>,
    pub energy: Option<Energy>,
    pub prosody: Option<serde_json::Value>,
    pub enable_breaths: Option<bool>,
    pub enable_ssml: Option<bool>,
    pub vad_sensitivity: Option<f32>,
}

impl CreateSessionRequest {
    pub fn into_config(self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            voice: self.voice.unwrap_or(defaults.voice),
            tone: self.tone.unwrap_or(defaults.tone),
            pace: self.pace.unwrap_or(defaults.pace),
            energy: self.energy.unwrap_or(defaults.energy),
            prosody: self.prosody.unwrap_or(defaults.prosody),
            enable_breaths: self.enable_breaths.unwrap_or(defaults.enable_breaths),
            enable_ssml: self.enable_ssml.unwrap_or(defaults.enable_ssml),
            vad_sensitivity: self.vad_sensitivity.unwrap_or(defaults.vad_sensitivity),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_applies_defaults() {
        let req = CreateSessionRequest { tenant_id: Some("t1".into()), ..Default::default() };
        let config = req.into_config();
        assert_eq!(config.voice, Voice::Alloy);
        assert_eq!(config.tone, Tone::Professional);
        assert!(config.enable_breaths);
        assert!(config.enable_ssml);
        assert!((config.vad_sensitivity - 0.5).abs() < 1e-6);
    }
}
