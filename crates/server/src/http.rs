//! HTTP control surface (§4.6): narrow request/response endpoints that
//! operate exclusively through [`SessionManager`] and FSM events. No
//! handler here ever mutates session fields directly.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use metrics_exporter_prometheus::PrometheusHandle;
use voice_agent_core::{CreateSessionRequest, Event};

use crate::session::SessionManager;
use crate::state::AppState;
use crate::websocket::WebSocketHandler;
use crate::ServerError;

/// `metrics_handle` is installed once by the caller (`main`, via
/// [`crate::metrics::init_metrics`]) since the Prometheus recorder is a
/// process-global singleton; tests build their own non-global handle.
pub fn create_router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let (cors_origins, cors_enabled) = {
        let config = state.get_config();
        (config.server.cors_origins.clone(), config.server.cors_enabled)
    };
    let cors_layer = build_cors_layer(&cors_origins, cors_enabled);

    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id", delete(delete_session))
        .route("/api/sessions/:id/interrupt", post(interrupt_session))
        .route("/api/sessions/:id/history", get(session_history))
        .route("/api/services/health", get(services_health))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(move || render_metrics(metrics_handle.clone())))
        .route("/admin/reload-config", post(reload_config))
        .route("/ws/:session_id", get(WebSocketHandler::handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled, allowing all origins (not suitable for production)");
        return CorsLayer::permissive();
    }
    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();
    if parsed.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
    transport_url: String,
    config: voice_agent_core::SessionConfig,
    state: String,
}

/// `create` (§4.6, §6): config fields are all optional and fall back to
/// the enumerated defaults.
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, StatusCode> {
    let tenant_id = request.tenant_id.clone().unwrap_or_default();
    let user_id = request.user_id.clone().unwrap_or_default();
    let config = request.into_config();

    let ws_path = state.get_config().server.ws_path.clone();
    let session = state.sessions.create(tenant_id, user_id, config.clone()).map_err(StatusCode::from)?;

    Ok(Json(CreateSessionResponse {
        transport_url: format!("{ws_path}/{}", session.id),
        session_id: session.id.clone(),
        config,
        state: session.state().to_string(),
    }))
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    state: String,
    config: voice_agent_core::SessionConfig,
    metrics: voice_agent_core::Metrics,
    history: Vec<voice_agent_core::Turn>,
    connected: bool,
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SessionResponse>, StatusCode> {
    let session = get_or_404(&state.sessions, &id)?;
    Ok(Json(SessionResponse {
        session_id: session.id.clone(),
        state: session.state().to_string(),
        config: session.orchestrator.config(),
        metrics: session.orchestrator.metrics(),
        history: session.orchestrator.history(),
        connected: !session.state().is_terminal(),
    }))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.sessions.delete(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn interrupt_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, StatusCode> {
    let session = get_or_404(&state.sessions, &id)?;
    session.orchestrator.on_event(Event::UserInterrupt);
    Ok(StatusCode::ACCEPTED)
}

async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<voice_agent_core::Turn>>, StatusCode> {
    let session = get_or_404(&state.sessions, &id)?;
    Ok(Json(session.orchestrator.history()))
}

async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions: Vec<serde_json::Value> = state
        .sessions
        .list()
        .into_iter()
        .map(|s| serde_json::json!({"session_id": s.id, "state": s.state().to_string()}))
        .collect();
    Json(serde_json::json!({"sessions": sessions, "count": sessions.len()}))
}

async fn services_health(State(state): State<AppState>) -> Json<voice_agent_services::ServicesHealth> {
    Json(state.services.health().await)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.sessions.count(),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let health = state.services.health().await;
    let ready = health.transcribe && health.reason && health.synthesize;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(serde_json::json!({"ready": ready, "services": health})))
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "reloaded"}))),
        Err(err) => {
            tracing::error!(error = %err, "config reload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"status": "error", "message": err})))
        }
    }
}

async fn render_metrics(handle: PrometheusHandle) -> String {
    handle.render()
}

fn get_or_404(sessions: &SessionManager, id: &str) -> Result<std::sync::Arc<crate::session::Session>, StatusCode> {
    sessions.get(id).ok_or_else(|| StatusCode::from(ServerError::SessionNotFound(id.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_config::Settings;
    use voice_agent_sink::NullSink;

    #[test]
    fn router_builds_with_default_config() {
        let state = AppState::new(Settings::default(), std::sync::Arc::new(NullSink));
        let (_recorder, handle) = metrics_exporter_prometheus::PrometheusBuilder::new().build().unwrap();
        let _ = create_router(state, handle);
    }
}
