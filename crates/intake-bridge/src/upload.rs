//! Attachment uploads.

use crate::bridge::{lock, SessionBridge, SendOptions};
use crate::client::UploadFile;
use crate::error::BridgeError;
use intake_types::wire::ChatResponse;
use intake_types::{Attachment, AttachmentKind, Message};
use std::collections::HashSet;
use std::sync::Mutex;

/// Marks one attachment kind as uploading until dropped.
struct UploadSlot<'a> {
    uploads: &'a Mutex<HashSet<AttachmentKind>>,
    kind: AttachmentKind,
}

impl<'a> UploadSlot<'a> {
    fn claim(uploads: &'a Mutex<HashSet<AttachmentKind>>, kind: &AttachmentKind) -> Option<Self> {
        lock(uploads).insert(kind.clone()).then(|| Self {
            uploads,
            kind: kind.clone(),
        })
    }
}

impl Drop for UploadSlot<'_> {
    fn drop(&mut self) {
        lock(self.uploads).remove(&self.kind);
    }
}

impl SessionBridge {
    /// Kinds with an upload currently in flight.
    pub fn uploads_in_flight(&self) -> Vec<AttachmentKind> {
        lock(&self.inner.uploads).iter().cloned().collect()
    }

    pub fn is_uploading(&self, kind: &AttachmentKind) -> bool {
        lock(&self.inner.uploads).contains(kind)
    }

    /// Uploads `file` as `kind`, then sends a turn describing it with the
    /// stored file attached.
    ///
    /// Uploads of different kinds may run concurrently with each other and
    /// with a chat turn; a second upload of the same kind is rejected. A
    /// session is minted first with a silent turn when none exists. Upload
    /// failures are reported in the transcript and never touch the exchange
    /// lane. The describing turn never reads or replaces the composing draft.
    ///
    /// Returns the reply to the describing turn, or `None` if that turn was
    /// not sent or failed.
    pub async fn upload_and_send(
        &self,
        file: UploadFile,
        kind: AttachmentKind,
    ) -> Result<Option<ChatResponse>, BridgeError> {
        let Some(_slot) = UploadSlot::claim(&self.inner.uploads, &kind) else {
            tracing::debug!(%kind, "upload of this kind already in flight");
            return Err(BridgeError::UploadInFlight(kind));
        };

        let limit = self.inner.config.max_upload_bytes;
        if file.len() > limit {
            tracing::warn!(%kind, size = file.len(), limit, "rejecting oversized upload");
            self.report_upload_failure(&kind, "the file is too large");
            return Err(BridgeError::Upload(format!(
                "{} is {} bytes, limit is {}",
                file.name,
                file.len(),
                limit
            )));
        }
        if file.is_empty() {
            self.report_upload_failure(&kind, "the file is empty");
            return Err(BridgeError::Upload(format!("{} is empty", file.name)));
        }

        let case_id = match self.ensure_session().await {
            Ok(case_id) => case_id,
            Err(error) => {
                self.report_upload_failure(&kind, "no session could be started");
                return Err(error);
            }
        };

        let url = match self
            .inner
            .backend
            .upload(&file, &kind, &case_id)
            .await
        {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(%kind, %case_id, %error, "upload failed");
                self.report_upload_failure(&kind, "please try again");
                return Err(BridgeError::Upload(error.to_string()));
            }
        };
        tracing::info!(%kind, %case_id, %url, "file uploaded");

        let text = format!("I've uploaded my {}: {}", kind.label(), file.name);
        let attachment = Attachment {
            kind,
            url,
            name: Some(file.name),
            content_type: file.content_type,
        };
        let reply = match self
            .send_when_idle(&text, vec![attachment], self.inner.config.idle_wait())
            .await
        {
            Ok(reply) => Some(reply),
            Err(error) => {
                tracing::warn!(%error, "upload turn not delivered");
                None
            }
        };
        Ok(reply)
    }

    /// Returns the current session id, minting one with the silent bootstrap
    /// turn when there is none.
    async fn ensure_session(&self) -> Result<String, BridgeError> {
        if let Some(session_id) = self.session_id() {
            return Ok(session_id);
        }
        let bootstrap = self.inner.config.bootstrap_message.clone();
        let timeout = self.inner.config.idle_wait();
        if !self.wait_until_idle(timeout).await {
            return Err(BridgeError::NoSession);
        }
        match self
            .exchange(&bootstrap, Vec::new(), SendOptions::silent())
            .await
        {
            Ok(_) | Err(BridgeError::Busy) => {}
            Err(error) => {
                tracing::warn!(%error, "bootstrap turn failed");
                return Err(BridgeError::NoSession);
            }
        }
        // A concurrent turn may have minted the session instead.
        if self.session_id().is_none() && !self.wait_until_idle(timeout).await {
            return Err(BridgeError::NoSession);
        }
        self.session_id().ok_or(BridgeError::NoSession)
    }

    fn report_upload_failure(&self, kind: &AttachmentKind, reason: &str) {
        self.conversation().messages.push(Message::agent(format!(
            "Sorry, I couldn't upload your {}: {}.",
            kind.label(),
            reason
        )));
    }
}
