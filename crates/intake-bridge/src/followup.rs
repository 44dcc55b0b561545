//! Messages posted by the embedded follow-up frame.

use crate::bridge::SessionBridge;
use intake_types::wire::{ChatResponse, FrameEvent};

impl SessionBridge {
    /// Handles a raw message posted by the witness frame. Unknown or
    /// malformed messages are ignored.
    pub async fn handle_frame_message(&self, raw: &str) -> Option<ChatResponse> {
        match serde_json::from_str::<FrameEvent>(raw) {
            Ok(FrameEvent::WitnessCompleted) => self.on_witness_completed().await,
            Ok(FrameEvent::Unknown) => {
                tracing::debug!("ignoring unrecognized frame message");
                None
            }
            Err(error) => {
                tracing::debug!(%error, "ignoring malformed frame message");
                None
            }
        }
    }

    /// Sends the confirmation turn once any in-flight exchange completes.
    ///
    /// If the lane does not free up within `bridge.idle_wait_ms`, the
    /// confirmation is dropped and logged.
    pub async fn on_witness_completed(&self) -> Option<ChatResponse> {
        let text = self.inner.config.confirmation_message.clone();
        match self
            .send_when_idle(&text, Vec::new(), self.inner.config.idle_wait())
            .await
        {
            Ok(response) => {
                tracing::info!(session_id = ?self.session_id(), "witnessed signature confirmed");
                Some(response)
            }
            Err(error) => {
                tracing::warn!(%error, "dropping witness confirmation");
                None
            }
        }
    }
}
