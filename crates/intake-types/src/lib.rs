//! Shared types for the Intake session bridge.
//!
//! This crate provides the foundational types used across all Intake crates:
//! conversation messages, attachment classification, server-declared
//! follow-ups, the `next` step hint, and the connection-issue tag that drives
//! the reconnect banner. Wire DTOs for the backend live in [`wire`]; voice
//! channel state and control-channel frames live in [`voice`].
//!
//! No crate in the workspace depends on anything *except* `intake-types` for
//! cross-cutting type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod voice;
pub mod wire;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person filling in the intake.
    User,
    /// The backend orchestrator.
    #[serde(alias = "assistant")]
    Agent,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

/// A single conversation turn.
///
/// Messages are append-only; the bridge never edits one after it is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }
}

/// Most recent failure class seen by the bridge.
///
/// Derived state: it is cleared by the next successful exchange or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionIssue {
    #[default]
    None,
    /// The previous session could not be restored.
    History,
    /// A chat exchange failed.
    Network,
}

impl ConnectionIssue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::History => "history",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for ConnectionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification tag carried by an uploaded file.
///
/// Serialized as its wire name (`photo_id`, `proof_of_address`, ...). Unknown
/// tags round-trip through [`AttachmentKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttachmentKind {
    /// Government-issued photo identification.
    PhotoId,
    /// Utility bill, bank statement or similar.
    ProofOfAddress,
    /// A photo of the applicant's face.
    Selfie,
    /// Any other supporting document.
    Document,
    Other(String),
}

impl AttachmentKind {
    /// Returns the wire name for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PhotoId => "photo_id",
            Self::ProofOfAddress => "proof_of_address",
            Self::Selfie => "selfie",
            Self::Document => "document",
            Self::Other(tag) => tag,
        }
    }

    /// Human-readable label used when describing an upload in chat.
    pub fn label(&self) -> &str {
        match self {
            Self::PhotoId => "photo ID",
            Self::ProofOfAddress => "proof of address",
            Self::Selfie => "selfie",
            Self::Document => "document",
            Self::Other(tag) => tag,
        }
    }

    /// Returns `true` for the kinds the bridge knows how to prompt for.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for AttachmentKind {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "photo_id" | "id" | "government_id" => Self::PhotoId,
            "proof_of_address" | "address" | "poa" => Self::ProofOfAddress,
            "selfie" => Self::Selfie,
            "document" | "doc" => Self::Document,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for AttachmentKind {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<AttachmentKind> for String {
    fn from(kind: AttachmentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file reference attached to exactly one outgoing chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MIME type of the uploaded file.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Followup types that call for the embedded signature-witnessing frame.
const SIGNATURE_FOLLOWUP_TYPES: &[&str] = &[
    "signature",
    "witness",
    "witness_signature",
    "capture_signature",
];

/// An outstanding task the backend has attached to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Followup {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Followup {
    /// A followup is open until the backend marks it done.
    pub fn is_open(&self) -> bool {
        !matches!(
            self.status.as_deref(),
            Some("completed") | Some("done") | Some("cancelled")
        )
    }

    /// Whether this followup asks for a witnessed signature.
    pub fn is_signature(&self) -> bool {
        SIGNATURE_FOLLOWUP_TYPES.contains(&self.kind.as_str())
    }

    /// The upload this followup is waiting on, if any.
    pub fn requested_upload(&self) -> Option<AttachmentKind> {
        if !self.is_open() {
            return None;
        }
        let kind = AttachmentKind::from(self.kind.as_str());
        kind.is_known().then_some(kind)
    }
}

/// Parsed form of the backend's `next` hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// The backend wants a file of the given kind.
    RequestUpload(AttachmentKind),
    /// The applicant must sign in front of a live witness.
    CaptureSignature,
    /// Intake finished.
    Complete,
    Other(String),
}

impl NextStep {
    pub fn parse(raw: &str) -> Self {
        let step = raw.trim();
        match step {
            "capture_signature" | "witness_signature" | "signature" => Self::CaptureSignature,
            "done" | "complete" | "completed" => Self::Complete,
            _ => {
                let requested = step
                    .strip_prefix("upload_")
                    .or_else(|| step.strip_prefix("request_"))
                    .filter(|kind| !kind.is_empty());
                match requested {
                    Some(kind) => Self::RequestUpload(AttachmentKind::from(kind)),
                    None => Self::Other(step.to_string()),
                }
            }
        }
    }

    pub fn is_capture_step(&self) -> bool {
        matches!(self, Self::CaptureSignature)
    }

    pub fn requested_upload(&self) -> Option<&AttachmentKind> {
        match self {
            Self::RequestUpload(kind) => Some(kind),
            _ => None,
        }
    }
}
