//! Real-time voice channel for the Intake session bridge.
//!
//! Upgrades a text session to a live, bidirectional voice conversation with a
//! third-party speech service. The controller owns a peer connection, its
//! auxiliary control channel and the local microphone capture; the host
//! supplies those primitives through the traits in [`media`].
//!
//! Credentials are never long-lived on this side: the backend broker mints an
//! ephemeral token per negotiation, and the offer SDP is posted to the speech
//! service with that token as a bearer credential.
//!
//! Inbound transcriptions of the user's speech are broadcast as
//! [`TranscriptionEvent`]s so the bridge can feed them back into the chat as
//! if typed.

pub mod broker;
pub mod config;
pub mod controller;
pub mod error;
pub mod media;

pub use broker::{EphemeralToken, VoiceBroker};
pub use config::{default_ice_servers, IceServer, VoiceConfig};
pub use controller::{TranscriptionEvent, VoiceChannelController, CONTROL_CHANNEL_LABEL};
pub use error::VoiceError;
pub use intake_types::voice::VoiceState;
pub use media::{
    AudioSink, CaptureStream, ControlChannel, LocalTrack, MediaDevices, OfferOptions,
    PeerConnection, PeerConnector, PeerEvent, RemoteTrack, VoiceDevices,
};
