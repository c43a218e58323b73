//! Reason: {messages, tenant_id, user_id, session_id} -> {response, citations?} (§6).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ServicesError;

const REASON_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ReasonRequest<'a> {
    messages: &'a [Message],
    tenant_id: &'a str,
    user_id: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ReasonResponse {
    pub response: String,
    #[serde(default)]
    pub citations: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct ReasonClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ReasonClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }

    pub async fn reason(
        &self,
        messages: &[Message],
        tenant_id: &str,
        user_id: &str,
        session_id: &str,
        token: &CancellationToken,
    ) -> Result<ReasonResponse, ServicesError> {
        let body = ReasonRequest { messages, tenant_id, user_id, session_id };
        let request = self.http.post(&self.endpoint).json(&body).send();

        tokio::select! {
            _ = token.cancelled() => Err(ServicesError::Cancelled),
            result = tokio::time::timeout(REASON_TIMEOUT, request) => {
                let response = result.map_err(|_| ServicesError::Timeout)?
                    .map_err(|e| ServicesError::Reasoning(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(ServicesError::Reasoning(format!(
                        "status {}",
                        response.status()
                    )));
                }
                response
                    .json::<ReasonResponse>()
                    .await
                    .map_err(|e| ServicesError::Reasoning(e.to_string()))
            }
        }
    }
}

/// Builds the alternating user/assistant message list the reasoning call
/// expects: at most the last 5 turns of history, plus the new user text
/// (§4.3).
pub fn build_messages(history_tail: &[(&'static str, String)]) -> Vec<Message> {
    history_tail
        .iter()
        .map(|(role, content)| Message { role, content: content.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_messages_preserves_order() {
        let tail = vec![
            ("user", "hi".to_string()),
            ("assistant", "hello".to_string()),
            ("user", "how are you".to_string()),
        ];
        let messages = build_messages(&tail);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[2].content, "how are you");
    }
}
