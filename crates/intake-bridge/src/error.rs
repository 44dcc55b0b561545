use intake_db::StoreError;
use intake_types::AttachmentKind;
use thiserror::Error;

/// Failures talking to the intake backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The upload succeeded but neither `fileUrl` nor `url` was present.
    #[error("upload response did not include a file URL")]
    MissingUrl,

    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// HTTP status of a rejected request, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors surfaced by [`SessionBridge`](crate::SessionBridge) operations.
///
/// Every variant has already been reflected in conversation state (banner,
/// agent-visible message) by the time the caller sees it.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("could not restore session {session_id}: {source}")]
    HistoryLoad {
        session_id: String,
        #[source]
        source: ClientError,
    },

    #[error("chat exchange failed: {0}")]
    ExchangeNetwork(#[source] ClientError),

    /// Another exchange or a history load holds the lane.
    #[error("an exchange is already in flight")]
    Busy,

    #[error("message is empty")]
    EmptyMessage,

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("an upload of kind '{0}' is already in progress")]
    UploadInFlight(AttachmentKind),

    #[error("no session could be established")]
    NoSession,

    #[error(transparent)]
    Store(#[from] StoreError),
}
