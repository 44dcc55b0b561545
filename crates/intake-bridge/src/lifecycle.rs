//! Session lifecycle: restore on start, reset, retry.
//!
//! This is the only module that writes the [`SessionStore`](intake_db::SessionStore).

use crate::bridge::SessionBridge;
use crate::error::BridgeError;
use crate::state::Activity;
use intake_types::ConnectionIssue;

impl SessionBridge {
    /// Restores the persisted session, if any. Called once at host start.
    ///
    /// A missing id leaves the bridge fresh; the first exchange mints one.
    pub async fn open(&self) -> Result<(), BridgeError> {
        match self.inner.store.load()? {
            Some(session_id) => {
                tracing::info!(%session_id, "restoring persisted session");
                self.restore_session(&session_id).await
            }
            None => {
                tracing::info!("no persisted session, starting fresh");
                Ok(())
            }
        }
    }

    /// Loads the history of `session_id` and rebuilds the conversation.
    ///
    /// Loads are serialized: a second call waits for the first to finish
    /// before touching any state. On failure the transcript is cleared, the
    /// banner reports a history issue, and `session_id` stays current so the
    /// next turn or [`retry`](Self::retry) continues it.
    pub async fn restore_session(&self, session_id: &str) -> Result<(), BridgeError> {
        let _serial = self.inner.restore_lock.lock().await;
        let _lane = self.claim(Activity::Restoring).await;

        let epoch = {
            let mut conversation = self.conversation();
            conversation.session_id = Some(session_id.to_string());
            conversation.epoch
        };

        let result = self.inner.backend.fetch_history(session_id).await;

        let mut conversation = self.conversation();
        if conversation.epoch != epoch {
            tracing::debug!(%session_id, "session was reset during restore, discarding history");
            return Ok(());
        }
        match result {
            Ok(history) => {
                tracing::debug!(%session_id, turns = history.messages.len(), "history restored");
                conversation.rebuild_from_history(history.messages);
                conversation.set_issue(ConnectionIssue::None);
                drop(conversation);
                self.persist_session(session_id);
                Ok(())
            }
            Err(source) => {
                tracing::warn!(%session_id, error = %source, "failed to restore session history");
                conversation.messages.clear();
                conversation.next = None;
                conversation.followups.clear();
                conversation.set_issue(ConnectionIssue::History);
                Err(BridgeError::HistoryLoad {
                    session_id: session_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Forgets the current session and clears all derived state, including
    /// the witness frame. The composing draft survives.
    ///
    /// A reply still in flight for the old session is discarded on arrival.
    pub fn start_new_session(&self) -> Result<(), BridgeError> {
        self.conversation().reset();
        self.inner.store.clear()?;
        tracing::info!("started a new session");
        Ok(())
    }

    /// Re-runs the restore for the retained session id. Without one there is
    /// nothing to retry and the issue is simply cleared.
    pub async fn retry(&self) -> Result<(), BridgeError> {
        match self.session_id() {
            Some(session_id) => self.restore_session(&session_id).await,
            None => {
                self.conversation().set_issue(ConnectionIssue::None);
                Ok(())
            }
        }
    }

    /// Hides the banner without changing the session. A new failure shows it
    /// again.
    pub fn dismiss_issue(&self) {
        self.conversation().issue_dismissed = true;
    }

    /// Writes the authoritative session id. Idempotent; a store failure only
    /// costs persistence across restarts, so it is logged and swallowed.
    pub(crate) fn persist_session(&self, session_id: &str) {
        if let Err(error) = self.inner.store.save(session_id) {
            tracing::warn!(%session_id, %error, "failed to persist session id");
        }
    }
}
