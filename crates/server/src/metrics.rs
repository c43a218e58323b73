//! Prometheus metrics (§10.1): transition counts, per-turn and
//! per-interrupt latency, service-call latency, backpressure drops, and
//! the active-session gauge.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder and returns a handle whose `render()`
/// produces the text exposition format for the `/metrics` endpoint.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder");
    describe_metrics();
    handle
}

fn describe_metrics() {
    metrics::describe_counter!("voice_engine_transitions_total", "state transitions by (from, to) pair");
    metrics::describe_histogram!("voice_engine_turn_latency_ms", "end-to-end turn latency, vad end to audio delivered");
    metrics::describe_histogram!(
        "voice_engine_interrupt_latency_ms",
        "time from a barge-in event to playback stopping"
    );
    metrics::describe_histogram!("voice_engine_service_call_latency_ms", "external service call latency by service");
    metrics::describe_counter!("voice_engine_backpressure_drops_total", "audio samples dropped by the buffer soft cap");
    metrics::describe_gauge!("voice_engine_active_sessions", "currently live sessions");
}

pub fn record_transition(from: &str, to: &str) {
    metrics::counter!("voice_engine_transitions_total", "from" => from.to_string(), "to" => to.to_string())
        .increment(1);
}

pub fn record_turn_latency_ms(latency_ms: u64) {
    metrics::histogram!("voice_engine_turn_latency_ms").record(latency_ms as f64);
}

pub fn record_interrupt_latency_ms(latency_ms: u64) {
    metrics::histogram!("voice_engine_interrupt_latency_ms").record(latency_ms as f64);
}

pub fn record_service_call_latency_ms(service: &str, latency_ms: u64) {
    metrics::histogram!("voice_engine_service_call_latency_ms", "service" => service.to_string())
        .record(latency_ms as f64);
}

pub fn record_backpressure_drop(count: u64) {
    if count > 0 {
        metrics::counter!("voice_engine_backpressure_drops_total").increment(count);
    }
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("voice_engine_active_sessions").set(count as f64);
}
