//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use voice_agent_config::{load_settings, Settings};
use voice_agent_services::{Endpoints, ServiceClients};
use voice_agent_sink::SessionSink;

use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    /// Wrapped in a lock so `/admin/reload` (§4.6) can swap it in place.
    pub config: Arc<RwLock<Settings>>,
    pub sessions: Arc<SessionManager>,
    pub services: ServiceClients,
    env: Option<String>,
}

impl AppState {
    pub fn new(config: Settings, sink: Arc<dyn SessionSink>) -> Self {
        Self::with_env(config, sink, None)
    }

    pub fn with_env(config: Settings, sink: Arc<dyn SessionSink>, env: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.services.reason_timeout_ms.max(
                config.services.transcribe_timeout_ms.max(config.services.synthesize_timeout_ms),
            )))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let services = ServiceClients::new(
            http,
            Endpoints {
                transcribe: config.services.transcribe_url.clone(),
                reason: config.services.reason_url.clone(),
                synthesize: config.services.synthesize_url.clone(),
            },
        );
        let sessions = Arc::new(SessionManager::new(
            config.session.max_sessions,
            Duration::from_millis(config.session.idle_timeout_ms),
            Duration::from_millis(config.session.cleanup_interval_ms),
            services.clone(),
            sink,
        ));

        Self { config: Arc::new(RwLock::new(config)), sessions, services, env }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    /// Reloads settings from disk/environment and swaps them in place.
    /// Existing sessions keep running against their already-captured
    /// `ServiceClients` and `SessionManager` limits; only the config
    /// snapshot handlers read (CORS origin reporting, `/health` payload,
    /// etc.) changes. A full re-wire would require recreating the
    /// `SessionManager`, which is deliberately out of scope for a hot
    /// reload (§4.6).
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref()).map_err(|e| format!("failed to reload config: {e}"))?;
        *self.config.write() = new_config;
        tracing::info!("configuration reloaded");
        Ok(())
    }
}
