//! Voice conversation engine server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_config::{load_settings, Settings};
use voice_agent_server::{create_router, init_metrics, AppState};
use voice_agent_sink::SessionSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("VOICE_ENGINE_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load configuration: {err}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice conversation engine");

    let scylla_config = voice_agent_sink::ScyllaConfig {
        hosts: config.sink.scylla_hosts.clone(),
        keyspace: config.sink.keyspace.clone(),
        replication_factor: config.sink.replication_factor,
    };
    let sink: Arc<dyn SessionSink> = match voice_agent_sink::connect(scylla_config).await {
        Ok(sink) => {
            tracing::info!(keyspace = %config.sink.keyspace, "sink connected");
            // `SessionSink` is implemented for `Arc<Sink>`, not `Sink` itself
            // (its methods take `self: &Arc<Self>` to spawn tasks), so the
            // trait object needs the extra layer of indirection here.
            Arc::new(sink)
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the sink; falling back to a no-op sink");
            Arc::new(voice_agent_sink::NullSink)
        }
    };

    let state = AppState::with_env(config.clone(), sink, env);
    let cleanup_shutdown = state.sessions.start_cleanup_task();

    let metrics_handle = init_metrics();
    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = cleanup_shutdown.send(true);
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_agent={},tower_http=warn", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer =
        if config.observability.log_json { tracing_subscriber::fmt::layer().json().boxed() } else { tracing_subscriber::fmt::layer().boxed() };
    subscriber.with(fmt_layer).init();
}
