//! Thin HTTP adapters for the three external services the orchestrator
//! calls: transcription, reasoning, synthesis (§6, §9).

pub mod error;
pub mod health;
pub mod reason;
pub mod synthesize;
pub mod transcribe;

pub use error::{ServiceKind, ServicesError};
pub use health::{check as services_health, ServicesHealth};
pub use reason::{build_messages, Message, ReasonClient, ReasonResponse};
pub use synthesize::SynthesizeClient;
pub use transcribe::{TranscribeClient, TranscribeResponse};

/// Endpoint URLs for the three services, resolved once from config and
/// threaded through to each client and to `services_health`.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub transcribe: String,
    pub reason: String,
    pub synthesize: String,
}

/// Bundles the three clients the orchestrator needs, all sharing one
/// `reqwest::Client` connection pool.
#[derive(Clone)]
pub struct ServiceClients {
    pub transcribe: TranscribeClient,
    pub reason: ReasonClient,
    pub synthesize: SynthesizeClient,
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl ServiceClients {
    pub fn new(http: reqwest::Client, endpoints: Endpoints) -> Self {
        let transcribe = TranscribeClient::new(http.clone(), endpoints.transcribe.clone());
        let reason = ReasonClient::new(http.clone(), endpoints.reason.clone());
        let synthesize = SynthesizeClient::new(http.clone(), endpoints.synthesize.clone());
        Self { transcribe, reason, synthesize, http, endpoints }
    }

    pub async fn health(&self) -> ServicesHealth {
        health::check(&self.http, &self.endpoints).await
    }
}
