//! Session lifecycle: creation, lookup, idle cleanup (§4.5). Each session
//! owns an [`Orchestrator`], and persistence is a passive subscriber to the
//! orchestrator's event stream rather than something the manager drives
//! directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use voice_agent_core::{ConversationState, SessionConfig};
use voice_agent_pipeline::{Orchestrator, OrchestratorEvent, TurnIdentity};
use voice_agent_services::ServiceClients;
use voice_agent_sink::SessionSink;
use voice_agent_transport::lifecycle::RECONNECT_GRACE;

use crate::ServerError;

/// One live conversation. Transport and control-surface handlers read
/// `orchestrator` for state/history/metrics and feed it events; the
/// manager only tracks liveness for idle cleanup.
pub struct Session {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub orchestrator: Arc<Orchestrator>,
    created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl Session {
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > idle_timeout
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn state(&self) -> ConversationState {
        self.orchestrator.state()
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    idle_timeout: Duration,
    cleanup_interval: Duration,
    services: ServiceClients,
    sink: Arc<dyn SessionSink>,
    pending_deletes: Mutex<HashMap<String, CancellationToken>>,
}

impl SessionManager {
    pub fn new(
        max_sessions: usize,
        idle_timeout: Duration,
        cleanup_interval: Duration,
        services: ServiceClients,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            idle_timeout,
            cleanup_interval,
            services,
            sink,
            pending_deletes: Mutex::new(HashMap::new()),
        }
    }

    /// Called when a transport disconnects uncleanly. The session survives
    /// for [`RECONNECT_GRACE`] so a reconnect can re-associate with it
    /// (§4.4 point 3); if nothing cancels the grace period, the session is
    /// torn down.
    pub fn schedule_delete(self: &Arc<Self>, id: String) {
        let token = CancellationToken::new();
        self.pending_deletes.lock().insert(id.clone(), token.clone());
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_GRACE) => {
                    manager.pending_deletes.lock().remove(&id);
                    manager.delete(&id);
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Cancels a pending grace-period teardown. Returns `true` if one was
    /// in flight (i.e. the reconnect landed within the grace window).
    pub fn cancel_pending_delete(&self, id: &str) -> bool {
        match self.pending_deletes.lock().remove(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Starts the background idle-sweep task. Returns a shutdown sender so
    /// callers can stop it during graceful shutdown.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup();
                        if removed > 0 {
                            tracing::info!(removed, remaining = manager.count(), "session cleanup swept idle sessions");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Creates a session, spawning its orchestrator and a task that
    /// forwards the orchestrator's event stream to the sink (§4.7).
    pub fn create(
        &self,
        tenant_id: String,
        user_id: String,
        config: SessionConfig,
    ) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Fatal("max sessions reached".to_string()));
            }
        }

        let id = Uuid::new_v4().to_string();
        let identity =
            TurnIdentity { session_id: id.clone(), tenant_id: tenant_id.clone(), user_id: user_id.clone() };
        let (orchestrator, event_rx) = Orchestrator::new(self.services.clone(), identity, config.clone());

        let session = Arc::new(Session {
            id: id.clone(),
            tenant_id,
            user_id,
            orchestrator: Arc::clone(&orchestrator),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
        });
        sessions.insert(id.clone(), Arc::clone(&session));
        drop(sessions);

        self.sink.upsert_session(
            id.clone(),
            ConversationState::Idle.to_string(),
            serde_json::to_value(&config).unwrap_or(serde_json::Value::Null),
            serde_json::to_value(orchestrator.metrics()).unwrap_or(serde_json::Value::Null),
            chrono::Utc::now(),
        );
        spawn_persistence_forwarder(Arc::clone(&self.sink), id, event_rx, Arc::clone(&orchestrator));
        crate::metrics::set_active_sessions(self.count());

        tracing::info!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Removes a session, tearing down its sink lock. Callers that mean to
    /// end the conversation should drive the fsm to `Ended` first so the
    /// final state/transition is persisted; this only drops bookkeeping.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            self.sink.forget_session(id);
            crate::metrics::set_active_sessions(self.count());
            tracing::info!(session_id = id, "session removed");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Removes sessions idle past the configured timeout. Returns how many
    /// were removed.
    pub fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions)
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let timeout = self.idle_timeout;
        let expired: Vec<String> =
            sessions.iter().filter(|(_, s)| s.is_expired(timeout)).map(|(id, _)| id.clone()).collect();

        for id in &expired {
            sessions.remove(id);
            self.sink.forget_session(id);
            tracing::info!(session_id = id, "session expired");
        }
        if !expired.is_empty() {
            crate::metrics::set_active_sessions(sessions.len());
        }
        expired.len()
    }
}

/// Subscribes to one orchestrator's event stream and mirrors state changes
/// and completed turns to the sink. Exits once the session reaches ENDED.
fn spawn_persistence_forwarder(
    sink: Arc<dyn SessionSink>,
    session_id: String,
    mut event_rx: tokio::sync::broadcast::Receiver<OrchestratorEvent>,
    orchestrator: Arc<Orchestrator>,
) {
    tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            match event {
                OrchestratorEvent::StateChanged { transition } => {
                    crate::metrics::record_transition(&transition.from.to_string(), &transition.to.to_string());
                    sink.record_transition(
                        session_id.clone(),
                        transition.from.to_string(),
                        transition.to.to_string(),
                        transition.event.clone(),
                        transition.metadata.clone(),
                        transition.at,
                    );
                    sink.upsert_session(
                        session_id.clone(),
                        transition.to.to_string(),
                        serde_json::to_value(orchestrator.config()).unwrap_or(serde_json::Value::Null),
                        serde_json::to_value(orchestrator.metrics()).unwrap_or(serde_json::Value::Null),
                        chrono::Utc::now(),
                    );
                }
                OrchestratorEvent::TurnComplete(turn) => {
                    crate::metrics::record_turn_latency_ms(turn.latency_ms);
                    sink.record_turn(
                        session_id.clone(),
                        turn.turn_id,
                        turn.user_text,
                        turn.assistant_text,
                        serde_json::to_value(&turn.citations).unwrap_or(serde_json::Value::Null),
                        turn.audio_duration_ms as i64,
                        turn.latency_ms as i64,
                        turn.completed_at,
                    );
                }
                OrchestratorEvent::Ended => break,
                _ => {}
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_services::Endpoints;
    use voice_agent_sink::NullSink;

    fn manager() -> Arc<SessionManager> {
        let http = reqwest::Client::new();
        let services = ServiceClients::new(
            http,
            Endpoints {
                transcribe: "http://127.0.0.1:0/transcribe".into(),
                reason: "http://127.0.0.1:0/reason".into(),
                synthesize: "http://127.0.0.1:0/synthesize".into(),
            },
        );
        Arc::new(SessionManager::new(
            2,
            Duration::from_millis(10),
            Duration::from_secs(3600),
            services,
            Arc::new(NullSink),
        ))
    }

    #[tokio::test]
    async fn create_get_delete_round_trip() {
        let manager = manager();
        let session = manager.create("t1".into(), "u1".into(), SessionConfig::default()).unwrap();
        let id = session.id.clone();

        assert!(manager.get(&id).is_some());
        assert_eq!(manager.count(), 1);
        assert!(manager.delete(&id));
        assert!(manager.get(&id).is_none());
    }

    #[tokio::test]
    async fn create_fails_over_capacity_when_nothing_is_idle() {
        let manager = manager();
        manager.create("t1".into(), "u1".into(), SessionConfig::default()).unwrap();
        manager.create("t1".into(), "u1".into(), SessionConfig::default()).unwrap();
        let result = manager.create("t1".into(), "u1".into(), SessionConfig::default());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cleanup_removes_idle_sessions() {
        let manager = manager();
        manager.create("t1".into(), "u1".into(), SessionConfig::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = manager.cleanup();
        assert_eq!(removed, 1);
        assert_eq!(manager.count(), 0);
    }
}
