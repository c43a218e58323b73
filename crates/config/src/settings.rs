//! Application settings, layered File -> Environment (§10.3).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub vad: VadDefaults,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_session()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }

        let rate_limit = &self.server.rate_limit;
        if rate_limit.enabled && rate_limit.messages_per_second == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.rate_limit.messages_per_second".to_string(),
                message: "must be at least 1 when rate limiting is enabled".to_string(),
            });
        }

        if self.environment.is_production() && self.server.cors_enabled && self.server.cors_origins.is_empty() {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured; this may block legitimate requests"
            );
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        if self.session.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.session.cleanup_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.cleanup_interval_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws/conversation".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,

    #[serde(default = "default_audio_bytes_per_second")]
    pub audio_bytes_per_second: u32,

    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f32,
}

fn default_messages_per_second() -> u32 {
    100
}
fn default_audio_bytes_per_second() -> u32 {
    64_000
}
fn default_burst_multiplier() -> f32 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            messages_per_second: default_messages_per_second(),
            audio_bytes_per_second: default_audio_bytes_per_second(),
            burst_multiplier: default_burst_multiplier(),
        }
    }
}

/// The three external service endpoints and their per-call timeouts (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_transcribe_url")]
    pub transcribe_url: String,
    #[serde(default = "default_transcribe_timeout_ms")]
    pub transcribe_timeout_ms: u64,

    #[serde(default = "default_reason_url")]
    pub reason_url: String,
    #[serde(default = "default_reason_timeout_ms")]
    pub reason_timeout_ms: u64,

    #[serde(default = "default_synthesize_url")]
    pub synthesize_url: String,
    #[serde(default = "default_synthesize_timeout_ms")]
    pub synthesize_timeout_ms: u64,
}

fn default_transcribe_url() -> String {
    "http://127.0.0.1:9001/transcribe".to_string()
}
fn default_transcribe_timeout_ms() -> u64 {
    10_000
}
fn default_reason_url() -> String {
    "http://127.0.0.1:9002/reason".to_string()
}
fn default_reason_timeout_ms() -> u64 {
    30_000
}
fn default_synthesize_url() -> String {
    "http://127.0.0.1:9003/synthesize".to_string()
}
fn default_synthesize_timeout_ms() -> u64 {
    30_000
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            transcribe_url: default_transcribe_url(),
            transcribe_timeout_ms: default_transcribe_timeout_ms(),
            reason_url: default_reason_url(),
            reason_timeout_ms: default_reason_timeout_ms(),
            synthesize_url: default_synthesize_url(),
            synthesize_timeout_ms: default_synthesize_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadDefaults {
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,
    #[serde(default = "default_vad_silence_window_ms")]
    pub silence_window_ms: u64,
}

fn default_vad_threshold() -> f32 {
    0.01
}
fn default_vad_silence_window_ms() -> u64 {
    1000
}

impl Default for VadDefaults {
    fn default() -> Self {
        Self { threshold: default_vad_threshold(), silence_window_ms: default_vad_silence_window_ms() }
    }
}

/// Session idle timeout and cleanup cadence (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_idle_timeout_ms() -> u64 {
    3_600_000
}
fn default_cleanup_interval_ms() -> u64 {
    300_000
}
fn default_max_sessions() -> usize {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}
fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "voice_engine".to_string())
}
fn default_replication_factor() -> u8 {
    1
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Logging configuration (§10.1). Consumed by `main.rs` to build the
/// `tracing-subscriber` filter/format layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_json: false }
    }
}

/// Load settings from `config/{default,env}.{yaml,toml}` layered under
/// `VOICE_ENGINE_`-prefixed environment variables.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    builder = builder.add_source(File::with_name("config/default").required(false));
    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }
    builder = builder.add_source(Environment::with_prefix("VOICE_ENGINE").separator("__").try_parsing(true));

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_has_expected_port() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.max_sessions, 1000);
    }

    #[test]
    fn server_validation_rejects_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
    }

    #[test]
    fn rate_limit_validation_rejects_zero_rate_when_enabled() {
        let mut settings = Settings::default();
        settings.server.rate_limit.enabled = true;
        settings.server.rate_limit.messages_per_second = 0;
        assert!(settings.validate_server().is_err());
    }

    #[test]
    fn session_validation_rejects_zero_max_sessions() {
        let mut settings = Settings::default();
        settings.session.max_sessions = 0;
        assert!(settings.validate_session().is_err());
    }
}
