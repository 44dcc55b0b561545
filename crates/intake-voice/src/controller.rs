//! The voice channel controller.
//!
//! Owns one peer connection, its control channel and the local capture
//! stream, and walks them through the negotiation sequence:
//!
//! 1. create the peer connection with the configured ICE servers
//! 2. capture the microphone and attach its tracks
//! 3. open the control channel (before the offer, so it is negotiated)
//! 4. create and apply the local offer with audio receive enabled
//! 5. trade the offer for an ephemeral credential at the broker
//! 6. post the offer to the speech service with that credential
//! 7. apply the answer; remote audio goes to the sink
//! 8. become [`VoiceState::Active`] once the control channel opens
//!
//! Any failure tears down every resource acquired so far before the error is
//! surfaced. [`VoiceChannelController::stop`] is synchronous, idempotent and
//! safe from any state.

use crate::broker::VoiceBroker;
use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::media::{
    CaptureStream, ControlChannel, LocalTrack, OfferOptions, PeerConnection, PeerEvent,
    VoiceDevices,
};
use intake_types::voice::{ControlMessage, ServerEvent, VoiceState};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Label of the control channel the speech service listens on.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Default capacity for the transcription broadcast channel.
const DEFAULT_TRANSCRIPTION_BROADCAST_CAPACITY: usize = 64;

/// Emitted when the speech service finishes transcribing the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionEvent {
    pub item_id: Option<String>,
    pub text: String,
}

#[derive(Default)]
struct Resources {
    /// Bumped by every start and every teardown; work belonging to an older
    /// generation must not touch the slots below.
    generation: u64,
    outgoing: Vec<Arc<dyn LocalTrack>>,
    peer: Option<Arc<dyn PeerConnection>>,
    channel: Option<Arc<dyn ControlChannel>>,
    capture: Option<Arc<dyn CaptureStream>>,
    events: Option<JoinHandle<()>>,
}

struct Inner {
    config: VoiceConfig,
    broker: VoiceBroker,
    devices: VoiceDevices,
    state_tx: watch::Sender<VoiceState>,
    last_error: Mutex<Option<String>>,
    resources: Mutex<Resources>,
    transcription_tx: broadcast::Sender<TranscriptionEvent>,
}

/// Handle to the per-host voice channel. Cheap to clone.
#[derive(Clone)]
pub struct VoiceChannelController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VoiceChannelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceChannelController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VoiceChannelController {
    /// Creates an idle controller.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] when an endpoint is missing, no ICE
    /// server is configured, or the HTTP client cannot be built.
    pub fn new(config: VoiceConfig, devices: VoiceDevices) -> Result<Self, VoiceError> {
        if config.ice_servers.is_empty() {
            return Err(VoiceError::Config(
                "at least one ICE server is required".to_string(),
            ));
        }
        let broker = VoiceBroker::new(&config)?;
        let (state_tx, _) = watch::channel(VoiceState::Idle);
        let (transcription_tx, _) = broadcast::channel(DEFAULT_TRANSCRIPTION_BROADCAST_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                broker,
                devices,
                state_tx,
                last_error: Mutex::new(None),
                resources: Mutex::new(Resources::default()),
                transcription_tx,
            }),
        })
    }

    pub fn state(&self) -> VoiceState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribes to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<VoiceState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribes to completed user transcriptions.
    pub fn subscribe_transcriptions(&self) -> broadcast::Receiver<TranscriptionEvent> {
        self.inner.transcription_tx.subscribe()
    }

    /// Diagnostic detail from the step that last failed.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// `true` only while active with an open control channel.
    pub fn is_active(&self) -> bool {
        self.state() == VoiceState::Active && self.inner.open_channel().is_some()
    }

    /// Negotiates the voice channel and waits for the control channel to open.
    ///
    /// On failure the controller is left in [`VoiceState::Error`] with every
    /// partially acquired resource released.
    pub async fn start(&self) -> Result<(), VoiceError> {
        let mut busy = None;
        self.inner.state_tx.send_if_modified(|state| match *state {
            VoiceState::Initializing | VoiceState::Active => {
                busy = Some(*state);
                false
            }
            _ => {
                *state = VoiceState::Initializing;
                true
            }
        });
        if let Some(state) = busy {
            return Err(VoiceError::AlreadyRunning(state));
        }
        *lock(&self.inner.last_error) = None;

        let generation = {
            let mut resources = lock(&self.inner.resources);
            resources.generation += 1;
            resources.generation
        };
        info!(generation, "starting voice channel");

        if let Err(e) = self.inner.negotiate(generation).await {
            if matches!(e, VoiceError::Cancelled) {
                debug!(generation, "voice start superseded by stop()");
            } else {
                warn!(generation, error = %e, "voice negotiation failed");
                self.inner.fail(generation, &e.to_string());
            }
            return Err(e);
        }

        self.wait_until_open(generation).await
    }

    async fn wait_until_open(&self, generation: u64) -> Result<(), VoiceError> {
        let mut state_rx = self.inner.state_tx.subscribe();
        let timeout = self.inner.config.open_timeout();
        let outcome = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|state| *state != VoiceState::Initializing),
        )
        .await;

        match outcome {
            Ok(Ok(state)) => {
                let state = *state;
                match state {
                    VoiceState::Active => {
                        info!(generation, "voice channel active");
                        Ok(())
                    }
                    VoiceState::Error => Err(VoiceError::Channel(
                        self.last_error()
                            .unwrap_or_else(|| "control channel failed to open".to_string()),
                    )),
                    _ => Err(VoiceError::Cancelled),
                }
            }
            Ok(Err(_)) => Err(VoiceError::Channel("state channel closed".to_string())),
            Err(_) => {
                let e = VoiceError::Channel(format!(
                    "control channel did not open within {}s",
                    timeout.as_secs()
                ));
                self.inner.fail(generation, &e.to_string());
                Err(e)
            }
        }
    }

    /// Asks the remote agent to say `text`.
    ///
    /// A no-op unless the channel is active with an open control channel.
    /// Never fails; problems are logged.
    pub async fn speak(&self, text: &str) {
        if self.state() != VoiceState::Active {
            debug!(state = %self.state(), "voice not active, skipping speak");
            return;
        }
        let Some(channel) = self.inner.open_channel() else {
            debug!("control channel not open, skipping speak");
            return;
        };

        let frame = match serde_json::to_string(&ControlMessage::speak(text)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode speak frame: {}", e);
                return;
            }
        };
        if let Err(e) = channel.send(&frame) {
            warn!("failed to send speak frame: {}", e);
            return;
        }
        debug!(chars = text.len(), "sent speak frame");

        self.inner.try_play().await;
    }

    /// Releases every resource and moves to [`VoiceState::Stopped`].
    pub fn stop(&self) {
        self.inner.teardown(VoiceState::Stopped);
    }
}

impl Inner {
    async fn negotiate(self: &Arc<Self>, generation: u64) -> Result<(), VoiceError> {
        let (peer, events) = self
            .devices
            .connector
            .connect(&self.config.ice_servers)
            .await?;
        self.adopt(generation, |r| r.peer = Some(peer.clone()))
            .ok_or_else(|| {
                peer.close();
                VoiceError::Cancelled
            })?;

        let capture = self
            .devices
            .media
            .capture_audio()
            .await
            .map_err(|e| match e {
                VoiceError::MediaPermission(detail) => VoiceError::MediaPermission(detail),
                other => VoiceError::MediaPermission(other.to_string()),
            })?;
        self.adopt(generation, |r| r.capture = Some(capture.clone()))
            .ok_or_else(|| {
                capture.tracks().iter().for_each(|track| track.stop());
                VoiceError::Cancelled
            })?;

        for track in capture.tracks() {
            peer.add_track(track.clone())?;
            self.adopt(generation, |r| r.outgoing.push(track))
                .ok_or(VoiceError::Cancelled)?;
        }

        let channel = peer.create_control_channel(CONTROL_CHANNEL_LABEL)?;
        self.adopt(generation, |r| r.channel = Some(channel.clone()))
            .ok_or_else(|| {
                channel.close();
                VoiceError::Cancelled
            })?;

        let offer = peer
            .create_offer(OfferOptions {
                receive_audio: true,
            })
            .await?;
        peer.set_local_description(&offer).await?;
        self.ensure_current(generation)?;

        let token = self.broker.request_token(&self.config.voice).await?;
        self.ensure_current(generation)?;

        let answer = self.broker.exchange_sdp(&offer, &token).await?;
        self.ensure_current(generation)?;

        peer.set_remote_description(&answer).await?;

        let task = tokio::spawn(run_events(Arc::downgrade(self), generation, events));
        let abort = task.abort_handle();
        match self.adopt(generation, move |r| r.events.replace(task)) {
            Some(Some(previous)) => previous.abort(),
            Some(None) => {}
            None => {
                abort.abort();
                return Err(VoiceError::Cancelled);
            }
        }

        debug!(generation, "remote description applied");
        Ok(())
    }

    /// Runs `put` against the resource slots if `generation` is still current.
    fn adopt<R>(&self, generation: u64, put: impl FnOnce(&mut Resources) -> R) -> Option<R> {
        let mut resources = lock(&self.resources);
        (resources.generation == generation).then(|| put(&mut resources))
    }

    fn ensure_current(&self, generation: u64) -> Result<(), VoiceError> {
        self.adopt(generation, |_| ()).ok_or(VoiceError::Cancelled)
    }

    fn open_channel(&self) -> Option<Arc<dyn ControlChannel>> {
        lock(&self.resources)
            .channel
            .clone()
            .filter(|channel| channel.is_open())
    }

    async fn try_play(&self) {
        if let Err(e) = self.devices.sink.play().await {
            debug!("remote audio playback deferred: {}", e);
        }
    }

    /// Records `reason`, releases everything and lands in `Error`, but only
    /// if `generation` still owns the controller.
    fn fail(&self, generation: u64, reason: &str) {
        if self.adopt(generation, |_| ()).is_none() {
            return;
        }
        *lock(&self.last_error) = Some(reason.to_string());
        self.teardown(VoiceState::Error);
    }

    /// Releases, in order: outgoing tracks, the peer connection, the control
    /// channel, and the capture stream's tracks.
    fn teardown(&self, final_state: VoiceState) {
        let (outgoing, peer, channel, capture, events) = {
            let mut resources = lock(&self.resources);
            resources.generation += 1;
            (
                std::mem::take(&mut resources.outgoing),
                resources.peer.take(),
                resources.channel.take(),
                resources.capture.take(),
                resources.events.take(),
            )
        };

        for track in &outgoing {
            track.stop();
        }
        if let Some(peer) = peer {
            peer.close();
        }
        if let Some(channel) = channel {
            channel.close();
        }
        if let Some(capture) = capture {
            for track in capture.tracks() {
                track.stop();
            }
        }
        self.devices.sink.detach();
        if let Some(events) = events {
            events.abort();
        }

        let previous = self.state_tx.send_replace(final_state);
        if previous != final_state {
            info!(from = %previous, to = %final_state, "voice channel torn down");
        }
    }

    fn handle_server_frame(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(ServerEvent::InputTranscriptionCompleted { item_id, transcript }) => {
                let transcript = transcript.trim();
                if transcript.is_empty() {
                    return;
                }
                debug!(chars = transcript.len(), "user transcription completed");
                // No subscribers is fine.
                let _ = self.transcription_tx.send(TranscriptionEvent {
                    item_id,
                    text: transcript.to_string(),
                });
            }
            Ok(ServerEvent::Error { error }) => {
                warn!(%error, "speech service reported an error");
            }
            Ok(ServerEvent::Other) => {}
            Err(e) => debug!("ignoring unparseable control frame: {}", e),
        }
    }
}

async fn run_events(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.ensure_current(generation).is_err() {
            break;
        }

        match event {
            PeerEvent::RemoteTrack(track) => {
                debug!(track = %track.id(), "remote audio track attached");
                inner.devices.sink.attach(track);
                inner.try_play().await;
            }
            PeerEvent::ControlOpen => {
                let opened = inner.state_tx.send_if_modified(|state| {
                    if *state == VoiceState::Initializing {
                        *state = VoiceState::Active;
                        true
                    } else {
                        false
                    }
                });
                if opened {
                    info!(generation, "control channel open");
                }
            }
            PeerEvent::ControlMessage(text) => inner.handle_server_frame(&text),
            PeerEvent::ControlClosed => {
                inner.fail(generation, "control channel closed");
                break;
            }
            PeerEvent::ConnectionFailed(reason) => {
                inner.fail(generation, &format!("connection failed: {}", reason));
                break;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("voice controller lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
