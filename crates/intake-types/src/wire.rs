//! Request and response bodies exchanged with the intake backend.

use crate::{Attachment, Followup, Role};
use serde::{Deserialize, Deserializer, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Reply to `POST /chat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// `None` unless the backend sent an explicit array.
    #[serde(default, deserialize_with = "followups_if_array")]
    pub followups: Option<Vec<Followup>>,
    #[serde(default, skip_serializing)]
    pub error: Option<String>,
}

/// Reply to `GET /chat/history/{session_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Turns in order. Entries with a role other than user or agent (a
    /// `system` note, say) are skipped rather than failing the whole load.
    #[serde(default, deserialize_with = "known_entries")]
    pub messages: Vec<HistoryEntry>,
}

/// One stored turn in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub message: String,
    #[serde(default)]
    pub meta: Option<HistoryMeta>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Reply metadata stored alongside agent turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryMeta {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default, deserialize_with = "followups_if_array")]
    pub followups: Option<Vec<Followup>>,
}

/// Reply to `POST /upload`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UploadResponse {
    #[serde(default, rename = "fileUrl")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl UploadResponse {
    /// The canonical URL, preferring `fileUrl` over `url`. Empty strings count
    /// as missing.
    pub fn canonical_url(&self) -> Option<&str> {
        self.file_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.trim().is_empty()))
    }
}

/// Generic `{ "error": "..." }` body carried by non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Messages posted to the host by the embedded follow-up frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum FrameEvent {
    #[serde(rename = "witness:completed")]
    WitnessCompleted,
    #[serde(other)]
    Unknown,
}

/// Accepts `followups` only when it is a JSON array; `null`, objects and other
/// shapes leave the caller's current set untouched. Entries that do not parse
/// as a followup are skipped.
fn followups_if_array<'de, D>(deserializer: D) -> Result<Option<Vec<Followup>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

fn known_entries<'de, D>(deserializer: D) -> Result<Vec<HistoryEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}
