//! Synthesize: {text, voice, tone, energy, pace, prosody, enable_breaths,
//! enable_ssml} -> opaque audio byte stream (§6).

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use voice_agent_core::SessionConfig;

use crate::error::ServicesError;

const SYNTHESIZE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: voice_agent_core::Voice,
    tone: voice_agent_core::Tone,
    energy: voice_agent_core::Energy,
    pace: voice_agent_core::Pace,
    prosody: &'a serde_json::Value,
    enable_breaths: bool,
    enable_ssml: bool,
}

#[derive(Clone)]
pub struct SynthesizeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SynthesizeClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }

    /// Returns the raw audio bytes the synthesis endpoint streamed back.
    /// A single frame per turn, per the spec's allowance that streaming
    /// synthesis is an unexercised extension.
    pub async fn synthesize(
        &self,
        text: &str,
        config: &SessionConfig,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, ServicesError> {
        let body = SynthesizeRequest {
            text,
            voice: config.voice,
            tone: config.tone,
            energy: config.energy,
            pace: config.pace,
            prosody: &config.prosody,
            enable_breaths: config.enable_breaths,
            enable_ssml: config.enable_ssml,
        };
        let request = self.http.post(&self.endpoint).json(&body).send();

        tokio::select! {
            _ = token.cancelled() => Err(ServicesError::Cancelled),
            result = tokio::time::timeout(SYNTHESIZE_TIMEOUT, request) => {
                let response = result.map_err(|_| ServicesError::Timeout)?
                    .map_err(|e| ServicesError::Synthesis(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(ServicesError::Synthesis(format!(
                        "status {}",
                        response.status()
                    )));
                }
                response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| ServicesError::Synthesis(e.to_string()))
            }
        }
    }
}
