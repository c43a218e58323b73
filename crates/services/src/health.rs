//! `services_health()` — dials each of the three endpoints with a 3s
//! timeout (§4.6, §10.4). A real check, not a static stub.

use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ServicesHealth {
    pub transcribe: bool,
    pub reason: bool,
    pub synthesize: bool,
}

pub async fn check(http: &reqwest::Client, endpoints: &crate::Endpoints) -> ServicesHealth {
    let (transcribe, reason, synthesize) = tokio::join!(
        probe(http, &endpoints.transcribe),
        probe(http, &endpoints.reason),
        probe(http, &endpoints.synthesize),
    );
    ServicesHealth { transcribe, reason, synthesize }
}

async fn probe(http: &reqwest::Client, endpoint: &str) -> bool {
    let request = http.head(endpoint).send();
    match tokio::time::timeout(HEALTH_TIMEOUT, request).await {
        Ok(Ok(response)) => response.status().is_success() || response.status().is_redirection(),
        _ => false,
    }
}
