//! The session bridge: one object per host that owns the conversation.
//!
//! All chat turns and history loads share a single lane guarded by
//! [`Activity`]. A turn claims the lane with [`SessionBridge::try_claim`] and
//! releases it when its [`LaneGuard`] drops, so every exit path (success,
//! error, cancellation) frees it. Lane changes are published on a
//! `tokio::sync::watch` channel, which is what queued work waits on.

use crate::client::BackendApi;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::state::{Activity, Banner, Conversation, WitnessFrame};
use intake_db::SessionStore;
use intake_types::wire::{ChatRequest, ChatResponse};
use intake_types::{Attachment, AttachmentKind, ConnectionIssue, Message};
use intake_voice::VoiceChannelController;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Per-call options for [`SessionBridge::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Send without echoing the user turn or appending the reply.
    pub silent: bool,
}

impl SendOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

/// Shared handle to the conversation. Cloning is cheap.
#[derive(Clone)]
pub struct SessionBridge {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) backend: Arc<dyn BackendApi>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) config: BridgeConfig,
    pub(crate) conversation: Mutex<Conversation>,
    pub(crate) activity: watch::Sender<Activity>,
    /// Serializes history loads end to end.
    pub(crate) restore_lock: tokio::sync::Mutex<()>,
    pub(crate) uploads: Mutex<HashSet<AttachmentKind>>,
    pub(crate) voice: Mutex<Option<VoiceChannelController>>,
}

/// Holds the exchange lane; resets it to [`Activity::Idle`] on drop.
pub(crate) struct LaneGuard<'a> {
    activity: &'a watch::Sender<Activity>,
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        self.activity.send_replace(Activity::Idle);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionBridge {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        store: Arc<dyn SessionStore>,
        config: BridgeConfig,
    ) -> Self {
        let (activity, _) = watch::channel(Activity::Idle);
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                config,
                conversation: Mutex::new(Conversation::default()),
                activity,
                restore_lock: tokio::sync::Mutex::new(()),
                uploads: Mutex::new(HashSet::new()),
                voice: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub(crate) fn conversation(&self) -> MutexGuard<'_, Conversation> {
        lock(&self.inner.conversation)
    }

    /// A copy of the whole conversation for rendering.
    pub fn snapshot(&self) -> Conversation {
        self.conversation().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.conversation().session_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.conversation().messages.clone()
    }

    pub fn connection_issue(&self) -> ConnectionIssue {
        self.conversation().connection_issue
    }

    pub fn upload_prompts(&self) -> Vec<AttachmentKind> {
        self.conversation().upload_prompts()
    }

    pub fn witness_frame(&self) -> Option<WitnessFrame> {
        self.conversation().witness_frame()
    }

    pub fn banner(&self) -> Option<Banner> {
        self.conversation().banner()
    }

    pub fn draft(&self) -> String {
        self.conversation().draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.conversation().draft = text.into();
    }

    pub fn activity(&self) -> Activity {
        *self.inner.activity.borrow()
    }

    /// `true` while a reply or a history load is outstanding.
    pub fn is_busy(&self) -> bool {
        self.activity() != Activity::Idle
    }

    pub fn subscribe_activity(&self) -> watch::Receiver<Activity> {
        self.inner.activity.subscribe()
    }

    /// Claims the lane if it is idle.
    pub(crate) fn try_claim(&self, next: Activity) -> Option<LaneGuard<'_>> {
        let mut claimed = false;
        self.inner.activity.send_if_modified(|current| {
            if *current == Activity::Idle {
                *current = next;
                claimed = true;
                true
            } else {
                false
            }
        });
        claimed.then(|| LaneGuard {
            activity: &self.inner.activity,
        })
    }

    /// Waits for the lane to free up, then claims it.
    pub(crate) async fn claim(&self, next: Activity) -> LaneGuard<'_> {
        let mut rx = self.inner.activity.subscribe();
        loop {
            if let Some(guard) = self.try_claim(next) {
                return guard;
            }
            // The sender lives in `inner`, which `self` keeps alive.
            let _ = rx.wait_for(|a| *a == Activity::Idle).await;
        }
    }

    /// Resolves `true` once the lane is idle, or `false` after `timeout`.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.activity.subscribe();
        let idle = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|a| *a == Activity::Idle)).await,
            Ok(Ok(_))
        );
        idle
    }

    /// Sends one chat turn.
    ///
    /// Returns `None` without touching the network when `text` is blank or
    /// the lane is busy, and `None` after recording a network issue when the
    /// exchange fails. Use [`exchange`](Self::exchange) to see why.
    pub async fn send(
        &self,
        text: &str,
        attachments: Vec<Attachment>,
        options: SendOptions,
    ) -> Option<ChatResponse> {
        self.exchange(text, attachments, options).await.ok()
    }

    /// [`send`](Self::send) with the rejection reason.
    pub async fn exchange(
        &self,
        text: &str,
        attachments: Vec<Attachment>,
        options: SendOptions,
    ) -> Result<ChatResponse, BridgeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BridgeError::EmptyMessage);
        }
        let Some(lane) = self.try_claim(Activity::Exchanging) else {
            tracing::debug!(activity = ?self.activity(), "lane busy, dropping turn");
            return Err(BridgeError::Busy);
        };

        let (request, epoch) = {
            let mut conversation = self.conversation();
            if !options.silent {
                conversation.messages.push(Message::user(text));
            }
            let request = ChatRequest {
                message: text.to_string(),
                session_id: conversation.session_id.clone(),
                attachments,
            };
            (request, conversation.epoch)
        };

        tracing::debug!(
            session_id = request.session_id.as_deref().unwrap_or("<new>"),
            attachments = request.attachments.len(),
            silent = options.silent,
            "sending chat turn"
        );

        match self.inner.backend.send_chat(&request).await {
            Ok(response) => {
                let adopted = {
                    let mut conversation = self.conversation();
                    if conversation.epoch == epoch {
                        conversation.adopt_reply(&response, options.silent);
                        Some(conversation.session_id.clone())
                    } else {
                        None
                    }
                };
                match adopted {
                    Some(Some(session_id)) => self.persist_session(&session_id),
                    Some(None) => {}
                    None => {
                        tracing::debug!("session was reset while awaiting reply, discarding it");
                        return Ok(response);
                    }
                }
                drop(lane);

                if !options.silent {
                    if let Some(reply) = response.reply.as_deref().filter(|r| !r.trim().is_empty())
                    {
                        self.relay_to_voice(reply).await;
                    }
                }
                Ok(response)
            }
            Err(error) => {
                tracing::warn!(%error, "chat exchange failed");
                let mut conversation = self.conversation();
                if conversation.epoch == epoch {
                    conversation.set_issue(ConnectionIssue::Network);
                    if !options.silent {
                        conversation
                            .messages
                            .push(Message::agent(self.inner.config.failure_message.clone()));
                    }
                }
                Err(BridgeError::ExchangeNetwork(error))
            }
        }
    }

    /// Sends the composing draft as a typed turn. The draft is cleared only
    /// when the turn is accepted onto the lane.
    pub async fn send_draft(&self) -> Option<ChatResponse> {
        let text = std::mem::take(&mut self.conversation().draft);
        match self.exchange(&text, Vec::new(), SendOptions::default()).await {
            Ok(response) => Some(response),
            Err(BridgeError::Busy | BridgeError::EmptyMessage) => {
                let mut conversation = self.conversation();
                if conversation.draft.is_empty() {
                    conversation.draft = text;
                }
                None
            }
            Err(_) => None,
        }
    }

    /// Sends `text` as soon as the lane frees up, giving up after `timeout`.
    pub async fn send_when_idle(
        &self,
        text: &str,
        attachments: Vec<Attachment>,
        timeout: Duration,
    ) -> Result<ChatResponse, BridgeError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .exchange(text, attachments.clone(), SendOptions::default())
                .await
            {
                Err(BridgeError::Busy) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() || !self.wait_until_idle(remaining).await {
                        return Err(BridgeError::Busy);
                    }
                }
                other => return other,
            }
        }
    }
}
