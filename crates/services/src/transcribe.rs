//! Transcribe: multipart audio upload -> {text, language?} (§6).

use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::ServicesError;

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct TranscribeResponse {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Clone)]
pub struct TranscribeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TranscribeClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }

    /// Uploads raw PCM samples as a multipart form. Cancellation-aware:
    /// if `token` fires before the response arrives, returns
    /// `ServicesError::Cancelled` without emitting a failure event upstream.
    pub async fn transcribe(
        &self,
        pcm16: Vec<u8>,
        token: &CancellationToken,
    ) -> Result<TranscribeResponse, ServicesError> {
        let part = multipart::Part::bytes(pcm16)
            .file_name("audio.pcm")
            .mime_str("application/octet-stream")
            .map_err(|e| ServicesError::Transcription(e.to_string()))?;
        let form = multipart::Form::new().part("audio", part);

        let request = self.http.post(&self.endpoint).multipart(form).send();

        tokio::select! {
            _ = token.cancelled() => Err(ServicesError::Cancelled),
            result = tokio::time::timeout(TRANSCRIBE_TIMEOUT, request) => {
                let response = result.map_err(|_| ServicesError::Timeout)?
                    .map_err(|e| ServicesError::Transcription(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(ServicesError::Transcription(format!(
                        "status {}",
                        response.status()
                    )));
                }
                response
                    .json::<TranscribeResponse>()
                    .await
                    .map_err(|e| ServicesError::Transcription(e.to_string()))
            }
        }
    }
}
