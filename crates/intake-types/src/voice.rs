//! Voice channel state and control-channel frame definitions.
//!
//! The control channel carries JSON frames in both directions: the bridge
//! sends [`ControlMessage`]s asking the remote agent to speak, and the speech
//! service emits [`ServerEvent`]s (transcriptions, errors, lifecycle noise).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the voice channel controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    #[default]
    Idle,
    /// Negotiation in progress.
    Initializing,
    /// Control channel open; `speak` is live.
    Active,
    /// A step failed; resources have already been released.
    Error,
    /// Explicitly stopped.
    Stopped,
}

impl VoiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing control-channel frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Ask the remote agent to vocalize the given instructions.
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseInstructions },
}

impl ControlMessage {
    pub fn speak(text: impl Into<String>) -> Self {
        Self::ResponseCreate {
            response: ResponseInstructions {
                instructions: text.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInstructions {
    pub instructions: String,
}

/// Incoming control-channel frame. Only the events the bridge reacts to are
/// modelled; everything else parses as [`ServerEvent::Other`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The service finished transcribing a user utterance.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        item_id: Option<String>,
        transcript: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: serde_json::Value,
    },
    #[serde(other)]
    Other,
}
