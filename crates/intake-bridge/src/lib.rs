//! Real-time conversational session bridge for the Intake product.
//!
//! A [`SessionBridge`] keeps one chat session alive across restarts, exchanges
//! turns with the intake backend, uploads supporting documents, and drives the
//! embedded signature-witnessing frame. When a
//! [`VoiceChannelController`](intake_voice::VoiceChannelController) is
//! attached, replies are spoken aloud and the user's speech comes back as
//! typed turns.
//!
//! The host supplies every platform facility through a seam:
//! [`BackendApi`] for the backend, [`SessionStore`](intake_db::SessionStore)
//! for persistence, and the `intake_voice` media traits for audio.

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
mod followup;
mod lifecycle;
pub mod state;
mod upload;
mod voice;

pub use bridge::{SendOptions, SessionBridge};
pub use client::{BackendApi, HttpBackend, UploadFile};
pub use config::{load_config, Config, ConfigError};
pub use error::{BridgeError, ClientError};
pub use state::{Activity, Banner, BannerAction, Conversation, WitnessFrame};
