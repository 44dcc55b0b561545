//! Host seams for audio capture, peer connections and playback.
//!
//! The controller never talks to a WebRTC stack directly. The host supplies
//! implementations of these traits (a browser binding, a native WebRTC
//! stack, or test fakes) and the controller drives them through the
//! negotiation sequence.
//!
//! Every `stop`/`close`/`detach` method must be idempotent: the controller
//! calls them unconditionally on teardown, sometimes twice.

use crate::config::IceServer;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An outgoing local media track (a microphone channel).
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> String;
    /// Releases the underlying capture device handle.
    fn stop(&self);
}

/// A stream of captured local tracks.
pub trait CaptureStream: Send + Sync {
    fn tracks(&self) -> Vec<Arc<dyn LocalTrack>>;
}

/// Access to the host's capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquires an audio-only capture stream. Implementations return
    /// [`VoiceError::MediaPermission`] when the user or platform denies it.
    async fn capture_audio(&self) -> Result<Arc<dyn CaptureStream>, VoiceError>;
}

/// A track received from the remote peer.
pub trait RemoteTrack: Send + Sync {
    fn id(&self) -> String;
}

/// The ordered control (data) channel carried alongside the media.
pub trait ControlChannel: Send + Sync {
    fn label(&self) -> String;
    fn is_open(&self) -> bool;
    fn send(&self, text: &str) -> Result<(), VoiceError>;
    fn close(&self);
}

/// Where remote audio ends up.
#[async_trait]
pub trait AudioSink: Send + Sync {
    fn attach(&self, track: Arc<dyn RemoteTrack>);
    /// Starts playback. Some platforms block this until a user gesture; the
    /// controller treats that error as non-fatal.
    async fn play(&self) -> Result<(), VoiceError>;
    fn detach(&self);
}

/// Options for the local offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub receive_audio: bool,
}

/// Asynchronous notifications raised by a peer connection.
pub enum PeerEvent {
    /// The remote side added a media track.
    RemoteTrack(Arc<dyn RemoteTrack>),
    /// The control channel finished opening.
    ControlOpen,
    /// A text frame arrived on the control channel.
    ControlMessage(String),
    /// The control channel closed.
    ControlClosed,
    /// ICE/DTLS failure or remote hang-up.
    ConnectionFailed(String),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteTrack(track) => write!(f, "RemoteTrack({})", track.id()),
            Self::ControlOpen => f.write_str("ControlOpen"),
            Self::ControlMessage(text) => write!(f, "ControlMessage({} bytes)", text.len()),
            Self::ControlClosed => f.write_str("ControlClosed"),
            Self::ConnectionFailed(reason) => write!(f, "ConnectionFailed({reason})"),
        }
    }
}

/// A local peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<(), VoiceError>;
    fn create_control_channel(&self, label: &str) -> Result<Arc<dyn ControlChannel>, VoiceError>;
    /// Produces the offer SDP. Channels created before this call are part of
    /// the offer.
    async fn create_offer(&self, options: OfferOptions) -> Result<String, VoiceError>;
    async fn set_local_description(&self, sdp: &str) -> Result<(), VoiceError>;
    async fn set_remote_description(&self, sdp: &str) -> Result<(), VoiceError>;
    fn close(&self);
}

/// Creates peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Creates a peer connection using `ice_servers` and returns it together
    /// with the receiving end of its event stream.
    async fn connect(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::UnboundedReceiver<PeerEvent>), VoiceError>;
}

/// Everything the host must provide for voice to work.
#[derive(Clone)]
pub struct VoiceDevices {
    pub media: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn PeerConnector>,
    pub sink: Arc<dyn AudioSink>,
}
