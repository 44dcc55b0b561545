//! Glue between the conversation and the voice channel.
//!
//! Replies are spoken through the attached controller; transcripts of what
//! the user said are fed back into the lane as typed turns.

use crate::bridge::{lock, SessionBridge};
use intake_voice::VoiceChannelController;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

impl SessionBridge {
    /// Attaches the host's voice controller, replacing any previous one.
    pub fn attach_voice(&self, controller: VoiceChannelController) {
        *lock(&self.inner.voice) = Some(controller);
    }

    /// Detaches the controller without stopping it.
    pub fn detach_voice(&self) -> Option<VoiceChannelController> {
        lock(&self.inner.voice).take()
    }

    pub fn voice(&self) -> Option<VoiceChannelController> {
        lock(&self.inner.voice).clone()
    }

    /// Speaks `reply` if a voice channel is attached. The controller itself
    /// decides whether it is active.
    pub(crate) async fn relay_to_voice(&self, reply: &str) {
        let Some(controller) = self.voice() else {
            return;
        };
        controller.speak(reply).await;
    }

    /// Forwards every completed transcription from the attached controller
    /// into the conversation as a user turn. Returns `None` when no
    /// controller is attached.
    ///
    /// The task ends once the bridge and the controller are both dropped.
    pub fn spawn_transcript_relay(&self) -> Option<JoinHandle<()>> {
        let mut transcripts = self.voice()?.subscribe_transcriptions();
        let weak = Arc::downgrade(&self.inner);
        Some(tokio::spawn(async move {
            loop {
                match transcripts.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        let bridge = SessionBridge { inner };
                        tracing::debug!(item_id = ?event.item_id, "relaying transcript");
                        let timeout = bridge.inner.config.idle_wait();
                        if let Err(error) = bridge
                            .send_when_idle(&event.text, Vec::new(), timeout)
                            .await
                        {
                            tracing::warn!(%error, "transcript not delivered");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "transcript relay lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
