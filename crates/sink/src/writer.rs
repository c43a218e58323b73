//! Best-effort, session-serialized writer for the three logical tables
//! (§4.7, §5 "the Sink is shared; it internally serializes writes per
//! session id"). Every public method is fire-and-forget: it spawns a task,
//! logs and swallows any failure, and never returns a `Result` to the
//! caller — a write failure must never affect session state (§7).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::client::ScyllaClient;

pub struct Sink {
    client: ScyllaClient,
    locks: RwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Sink {
    pub fn new(client: ScyllaClient) -> Arc<Self> {
        Arc::new(Self { client, locks: RwLock::new(HashMap::new()) })
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.locks.read().get(session_id) {
            return Arc::clone(lock);
        }
        Arc::clone(
            self.locks
                .write()
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Session-row upsert. Per §4.7, happens on create, on any state
    /// change, and on reaching ENDED.
    pub fn upsert_session(
        self: &Arc<Self>,
        session_id: String,
        state: String,
        config_json: serde_json::Value,
        metrics_json: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let lock = this.session_lock(&session_id);
            let _guard = lock.lock().await;
            let keyspace = this.client.keyspace();
            let query = format!(
                "INSERT INTO {keyspace}.sessions (session_id, state, config_json, metrics_json, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            );
            let result = this
                .client
                .session()
                .query_unpaged(
                    query,
                    (
                        &session_id,
                        &state,
                        config_json.to_string(),
                        metrics_json.to_string(),
                        now,
                        now,
                    ),
                )
                .await;
            if let Err(err) = result {
                tracing::warn!(session_id = %session_id, error = %err, "sink: session upsert failed");
            }
        });
    }

    /// Turn-row insert. Per §4.7, happens on SPEAKING -> IDLE only.
    pub fn record_turn(
        self: &Arc<Self>,
        session_id: String,
        turn_id: Uuid,
        user_text: String,
        assistant_text: String,
        citations_json: serde_json::Value,
        audio_duration_ms: i64,
        latency_ms: i64,
        completed_at: DateTime<Utc>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let lock = this.session_lock(&session_id);
            let _guard = lock.lock().await;
            let keyspace = this.client.keyspace();
            let query = format!(
                "INSERT INTO {keyspace}.turns (session_id, turn_id, user_text, assistant_text, citations_json, \
                 audio_duration_ms, latency_ms, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            );
            let result = this
                .client
                .session()
                .query_unpaged(
                    query,
                    (
                        &session_id,
                        turn_id,
                        &user_text,
                        &assistant_text,
                        citations_json.to_string(),
                        audio_duration_ms,
                        latency_ms,
                        completed_at,
                    ),
                )
                .await;
            if let Err(err) = result {
                tracing::warn!(session_id = %session_id, error = %err, "sink: turn write failed");
            }
        });
    }

    /// Transition-row insert. Per §4.7, happens on every state change.
    pub fn record_transition(
        self: &Arc<Self>,
        session_id: String,
        from_state: String,
        to_state: String,
        event: String,
        metadata_json: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let lock = this.session_lock(&session_id);
            let _guard = lock.lock().await;
            let keyspace = this.client.keyspace();
            let query = format!(
                "INSERT INTO {keyspace}.transitions (session_id, at, from_state, to_state, event, metadata_json) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            );
            let metadata = metadata_json.map(|v| v.to_string());
            let result = this
                .client
                .session()
                .query_unpaged(query, (&session_id, at, &from_state, &to_state, &event, metadata))
                .await;
            if let Err(err) = result {
                tracing::warn!(session_id = %session_id, error = %err, "sink: transition write failed");
            }
        });
    }

    /// Drops the per-session serialization lock once a session has ended,
    /// so the lock table does not grow without bound.
    pub fn forget_session(&self, session_id: &str) {
        self.locks.write().remove(session_id);
    }
}

/// Object-safe view of [`Sink`] so callers (the session manager) can depend
/// on a trait rather than a concrete ScyllaDB-backed type, and tests can
/// substitute [`NullSink`].
pub trait SessionSink: Send + Sync {
    fn upsert_session(
        &self,
        session_id: String,
        state: String,
        config_json: serde_json::Value,
        metrics_json: serde_json::Value,
        now: DateTime<Utc>,
    );

    fn record_turn(
        &self,
        session_id: String,
        turn_id: Uuid,
        user_text: String,
        assistant_text: String,
        citations_json: serde_json::Value,
        audio_duration_ms: i64,
        latency_ms: i64,
        completed_at: DateTime<Utc>,
    );

    fn record_transition(
        &self,
        session_id: String,
        from_state: String,
        to_state: String,
        event: String,
        metadata_json: Option<serde_json::Value>,
        at: DateTime<Utc>,
    );

    fn forget_session(&self, session_id: &str);
}

impl SessionSink for Arc<Sink> {
    fn upsert_session(
        &self,
        session_id: String,
        state: String,
        config_json: serde_json::Value,
        metrics_json: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        Sink::upsert_session(self, session_id, state, config_json, metrics_json, now)
    }

    fn record_turn(
        &self,
        session_id: String,
        turn_id: Uuid,
        user_text: String,
        assistant_text: String,
        citations_json: serde_json::Value,
        audio_duration_ms: i64,
        latency_ms: i64,
        completed_at: DateTime<Utc>,
    ) {
        Sink::record_turn(
            self,
            session_id,
            turn_id,
            user_text,
            assistant_text,
            citations_json,
            audio_duration_ms,
            latency_ms,
            completed_at,
        )
    }

    fn record_transition(
        &self,
        session_id: String,
        from_state: String,
        to_state: String,
        event: String,
        metadata_json: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) {
        Sink::record_transition(self, session_id, from_state, to_state, event, metadata_json, at)
    }

    fn forget_session(&self, session_id: &str) {
        Sink::forget_session(self, session_id)
    }
}

/// No-op sink used by tests that exercise session/orchestrator wiring
/// without a ScyllaDB instance.
#[derive(Default)]
pub struct NullSink;

impl SessionSink for NullSink {
    fn upsert_session(&self, _: String, _: String, _: serde_json::Value, _: serde_json::Value, _: DateTime<Utc>) {}

    fn record_turn(
        &self,
        _: String,
        _: Uuid,
        _: String,
        _: String,
        _: serde_json::Value,
        _: i64,
        _: i64,
        _: DateTime<Utc>,
    ) {
    }

    fn record_transition(
        &self,
        _: String,
        _: String,
        _: String,
        _: String,
        _: Option<serde_json::Value>,
        _: DateTime<Utc>,
    ) {
    }

    fn forget_session(&self, _: &str) {}
}
