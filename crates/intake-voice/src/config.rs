use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

fn default_realtime_url() -> String {
    "https://api.openai.com/v1/realtime".to_string()
}

fn default_model() -> String {
    "gpt-4o-realtime-preview".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_open_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    20
}

/// Public STUN servers used when none are configured.
pub fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
        ],
        username: String::new(),
        credential: String::new(),
    }]
}

/// A STUN/TURN server used for NAT traversal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential: String,
}

impl fmt::Debug for IceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credential = if self.credential.is_empty() {
            ""
        } else {
            "[REDACTED]"
        };
        f.debug_struct("IceServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &credential)
            .finish()
    }
}

/// Voice channel settings.
///
/// Holds no long-lived speech-service secret: the controller only ever sees
/// the ephemeral credential minted by the broker at `token_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Backend broker endpoint that mints ephemeral credentials.
    #[serde(default)]
    pub token_url: String,
    /// Speech service SDP endpoint.
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    /// Model name passed as the `model` query parameter. Empty disables it.
    #[serde(default = "default_model")]
    pub model: String,
    /// Voice preset sent to the broker.
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,
    /// How long `start()` waits for the control channel to open after the
    /// answer is applied.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
    /// Timeout for the broker and SDP requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            realtime_url: default_realtime_url(),
            model: default_model(),
            voice: default_voice(),
            ice_servers: default_ice_servers(),
            open_timeout_secs: default_open_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl VoiceConfig {
    pub fn new(token_url: impl Into<String>, realtime_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            realtime_url: realtime_url.into(),
            ..Self::default()
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Voice is usable only once both endpoints are known.
    pub fn is_enabled(&self) -> bool {
        !self.token_url.is_empty() && !self.realtime_url.is_empty()
    }
}
