//! HTTP client for the intake backend.
//!
//! [`BackendApi`] is the seam the bridge talks through; [`HttpBackend`] is the
//! production implementation over `reqwest`. Tests substitute in-memory fakes.

use crate::error::ClientError;
use async_trait::async_trait;
use intake_types::wire::{ChatRequest, ChatResponse, ErrorBody, HistoryResponse, UploadResponse};
use intake_types::AttachmentKind;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use std::path::Path;
use std::time::Duration;

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Builds an upload, sniffing the MIME type from the leading bytes.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content_type = detect_content_type(&bytes).map(str::to_string);
        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }

    /// Reads `path` from disk. The file name becomes the upload name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Detects the MIME type from magic bytes.
fn detect_content_type(data: &[u8]) -> Option<&'static str> {
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        Some("image/jpeg")
    } else if data.len() >= 8 && data[..8] == [137, 80, 78, 71, 13, 10, 26, 10] {
        Some("image/png")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.len() >= 5 && &data[..5] == b"%PDF-" {
        Some("application/pdf")
    } else if data.len() >= 12
        && &data[4..8] == b"ftyp"
        && matches!(&data[8..12], b"heic" | b"heix" | b"mif1")
    {
        Some("image/heic")
    } else {
        None
    }
}

/// Operations the bridge needs from the intake backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `POST /chat`.
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;

    /// `GET /chat/history/{session_id}`.
    async fn fetch_history(&self, session_id: &str) -> Result<HistoryResponse, ClientError>;

    /// `POST /upload`. Returns the canonical URL of the stored file.
    async fn upload(
        &self,
        file: &UploadFile,
        kind: &AttachmentKind,
        case_id: &str,
    ) -> Result<String, ClientError>;
}

/// [`BackendApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turns a non-success response into [`ClientError::Status`], preferring the
/// backend's `{error}` text over the raw body.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or(body);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let url = self.endpoint(&["chat"])?;
        let response = self.http.post(url).json(request).send().await?;
        decode(check_status(response).await?).await
    }

    async fn fetch_history(&self, session_id: &str) -> Result<HistoryResponse, ClientError> {
        let url = self.endpoint(&["chat", "history", session_id])?;
        let response = self.http.get(url).send().await?;
        decode(check_status(response).await?).await
    }

    async fn upload(
        &self,
        file: &UploadFile,
        kind: &AttachmentKind,
        case_id: &str,
    ) -> Result<String, ClientError> {
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new()
            .part("file", part)
            .text("kind", kind.as_str().to_string())
            .text("case_id", case_id.to_string());

        let url = self.endpoint(&["upload"])?;
        let response = self.http.post(url).multipart(form).send().await?;
        let parsed: UploadResponse = decode(check_status(response).await?).await?;

        match parsed.canonical_url() {
            Some(url) => Ok(url.to_string()),
            None => match parsed.error {
                Some(message) => Err(ClientError::Decode(message)),
                None => Err(ClientError::MissingUrl),
            },
        }
    }
}
