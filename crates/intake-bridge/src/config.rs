//! Host configuration loading from file and environment variables.

use intake_voice::VoiceConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Intake backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Session store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Voice channel settings. `voice.token_url` defaults to the backend's
    /// `/voice/token` broker.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Conversation behavior.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Where the intake backend lives.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://localhost:8000`.
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "intake_bridge=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Conversation behavior knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Silent turn sent to mint a session before the first upload.
    #[serde(default = "default_bootstrap_message")]
    pub bootstrap_message: String,

    /// Turn sent after the witness frame reports completion.
    #[serde(default = "default_confirmation_message")]
    pub confirmation_message: String,

    /// Agent-visible text appended when an exchange fails.
    #[serde(default = "default_failure_message")]
    pub failure_message: String,

    /// How long a queued turn waits for the in-flight exchange, in
    /// milliseconds.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Largest file accepted by `upload_and_send`, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// URL of the ephemeral-credential broker.
    pub fn voice_token_url(&self) -> String {
        format!("{}/voice/token", self.base_url.trim_end_matches('/'))
    }
}

impl BridgeConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_db_path() -> String {
    "intake.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bootstrap_message() -> String {
    "Hello, I'd like to start my intake.".to_string()
}

fn default_confirmation_message() -> String {
    "I've completed the witnessed signature.".to_string()
}

fn default_failure_message() -> String {
    "Sorry, I couldn't reach the intake service. Please try again.".to_string()
}

fn default_idle_wait_ms() -> u64 {
    10_000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bootstrap_message: default_bootstrap_message(),
            confirmation_message: default_confirmation_message(),
            failure_message: default_failure_message(),
            idle_wait_ms: default_idle_wait_ms(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `INTAKE_BACKEND_URL` overrides `backend.base_url`
/// - `INTAKE_DB_PATH` overrides `storage.path`
/// - `INTAKE_LOG_LEVEL` overrides `logging.level`
/// - `INTAKE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `INTAKE_VOICE_PRESET` overrides `voice.voice`
/// - `INTAKE_REALTIME_URL` overrides `voice.realtime_url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.voice.token_url.trim().is_empty() {
        config.voice.token_url = config.backend.voice_token_url();
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("INTAKE_BACKEND_URL") {
        config.backend.base_url = url;
    }
    if let Some(db_path) = var("INTAKE_DB_PATH") {
        config.storage.path = db_path;
    }
    if let Some(level) = var("INTAKE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("INTAKE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(voice) = var("INTAKE_VOICE_PRESET") {
        config.voice.voice = voice;
    }
    if let Some(url) = var("INTAKE_REALTIME_URL") {
        config.voice.realtime_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.storage.path, "intake.db");
        assert_eq!(config.bridge.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/intake.toml")).unwrap();
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert!(config.voice.token_url.ends_with("/voice/token"));
    }

    #[test]
    fn parses_sections_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            base_url = "https://intake.example.com/"

            [bridge]
            idle_wait_ms = 250

            [voice]
            voice = "verse"
            "#,
        )
        .unwrap();
        assert_eq!(config.bridge.idle_wait(), Duration::from_millis(250));
        assert_eq!(config.voice.voice, "verse");
        assert_eq!(
            config.backend.voice_token_url(),
            "https://intake.example.com/voice/token"
        );
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("INTAKE_BACKEND_URL", "http://backend:9000"),
            ("INTAKE_DB_PATH", "/tmp/other.db"),
            ("INTAKE_LOG_JSON", "1"),
            ("INTAKE_VOICE_PRESET", "sage"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.backend.base_url, "http://backend:9000");
        assert_eq!(config.storage.path, "/tmp/other.db");
        assert!(config.logging.json);
        assert_eq!(config.voice.voice, "sage");
        assert_eq!(config.logging.level, "info");
    }
}
