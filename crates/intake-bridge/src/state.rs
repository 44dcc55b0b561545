//! Conversation state and the affordances derived from it.
//!
//! Upload prompts, the witness frame and the reconnect banner are never
//! stored: they are recomputed from `next` and `followups` on every read, so
//! they cannot drift from the latest reply.

use intake_types::wire::{ChatResponse, HistoryEntry};
use intake_types::{AttachmentKind, ConnectionIssue, Followup, Message, NextStep, Role};

/// Which single activity currently owns the exchange lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    /// A history load is rebuilding the conversation.
    Restoring,
    /// A chat turn is awaiting its reply.
    Exchanging,
}

/// Everything the host renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub next: Option<String>,
    pub followups: Vec<Followup>,
    pub connection_issue: ConnectionIssue,
    /// Text the user is composing but has not sent.
    pub draft: String,
    pub(crate) issue_dismissed: bool,
    /// Bumped on every reset; replies from an older epoch are discarded.
    pub(crate) epoch: u64,
}

/// Props for the embedded signature-witnessing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessFrame {
    pub case_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerAction {
    Retry,
    Restart,
}

/// Reconnect banner shown while a connection issue is unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub issue: ConnectionIssue,
    pub message: &'static str,
    pub actions: Vec<BannerAction>,
}

impl Conversation {
    pub fn next_step(&self) -> Option<NextStep> {
        self.next.as_deref().map(NextStep::parse)
    }

    /// Upload kinds the backend is currently waiting on, in order of first
    /// mention: the `next` hint first, then open followups.
    pub fn upload_prompts(&self) -> Vec<AttachmentKind> {
        let mut prompts: Vec<AttachmentKind> = Vec::new();
        let from_next = self
            .next_step()
            .and_then(|step| step.requested_upload().cloned());
        let from_followups = self.followups.iter().filter_map(Followup::requested_upload);
        for kind in from_next.into_iter().chain(from_followups) {
            if !prompts.contains(&kind) {
                prompts.push(kind);
            }
        }
        prompts
    }

    /// The witness frame, visible while the backend asks for a signature
    /// capture or lists any signature followup, whatever its status.
    pub fn witness_frame(&self) -> Option<WitnessFrame> {
        let capture_next = self
            .next_step()
            .is_some_and(|step| step.is_capture_step());
        let signature_followup = self
            .followups
            .iter()
            .any(Followup::is_signature);
        if !(capture_next || signature_followup) {
            return None;
        }
        self.session_id.as_ref().map(|id| WitnessFrame {
            case_id: id.clone(),
        })
    }

    pub fn banner(&self) -> Option<Banner> {
        if self.issue_dismissed {
            return None;
        }
        let message = match self.connection_issue {
            ConnectionIssue::None => return None,
            ConnectionIssue::History => "We couldn't restore your previous session.",
            ConnectionIssue::Network => "We lost connection to the intake service.",
        };
        Some(Banner {
            issue: self.connection_issue,
            message,
            actions: vec![BannerAction::Retry, BannerAction::Restart],
        })
    }

    pub(crate) fn set_issue(&mut self, issue: ConnectionIssue) {
        self.connection_issue = issue;
        self.issue_dismissed = false;
    }

    /// Clears everything except the draft and starts a new epoch.
    pub(crate) fn reset(&mut self) {
        let draft = std::mem::take(&mut self.draft);
        let epoch = self.epoch.wrapping_add(1);
        *self = Self {
            draft,
            epoch,
            ..Self::default()
        };
    }

    /// Folds a successful reply into the conversation. `next` is only
    /// replaced when present and `followups` only when the reply carried an
    /// array.
    pub(crate) fn adopt_reply(&mut self, response: &ChatResponse, silent: bool) {
        if let Some(id) = response
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            self.session_id = Some(id.to_string());
        }
        if !silent {
            if let Some(reply) = response.reply.as_deref().filter(|r| !r.trim().is_empty()) {
                self.messages.push(Message::agent(reply));
            }
        }
        if let Some(next) = &response.next {
            self.next = Some(next.clone());
        }
        if let Some(followups) = &response.followups {
            self.followups = followups.clone();
        }
        self.set_issue(ConnectionIssue::None);
    }

    /// Replaces the transcript with stored history and re-derives `next` and
    /// `followups` from the latest agent turn that carried metadata.
    pub(crate) fn rebuild_from_history(&mut self, entries: Vec<HistoryEntry>) {
        let latest_meta = entries
            .iter()
            .rev()
            .filter(|entry| entry.role == Role::Agent)
            .find_map(|entry| entry.meta.clone());

        self.messages = entries
            .into_iter()
            .map(|entry| Message {
                role: entry.role,
                text: entry.message,
            })
            .collect();

        match latest_meta {
            Some(meta) => {
                self.next = meta.next;
                self.followups = meta.followups.unwrap_or_default();
            }
            None => {
                self.next = None;
                self.followups.clear();
            }
        }
    }
}
