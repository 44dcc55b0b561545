use intake_types::voice::VoiceState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("microphone unavailable: {0}")]
    MediaPermission(String),

    #[error("token broker error: {0}")]
    TokenBroker(String),

    #[error("remote negotiation failed: {0}")]
    RemoteNegotiation(String),

    #[error("control channel error: {0}")]
    Channel(String),

    #[error("peer connection error: {0}")]
    Peer(String),

    #[error("playback blocked: {0}")]
    Playback(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("voice channel is already {0}")]
    AlreadyRunning(VoiceState),

    #[error("voice start was cancelled by stop()")]
    Cancelled,
}
