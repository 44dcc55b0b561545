//! In-memory media/peer fakes and a fake broker + speech service.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use intake_voice::{
    AudioSink, CaptureStream, ControlChannel, IceServer, LocalTrack, MediaDevices, OfferOptions,
    PeerConnection, PeerConnector, PeerEvent, RemoteTrack, VoiceConfig, VoiceDevices, VoiceError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ── Media ──

#[derive(Default)]
pub struct FakeTrack {
    pub id: String,
    pub stops: AtomicUsize,
}

impl FakeTrack {
    pub fn stopped(&self) -> bool {
        self.stops.load(Ordering::SeqCst) > 0
    }
}

impl LocalTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeStream {
    pub tracks: Vec<Arc<FakeTrack>>,
}

impl CaptureStream for FakeStream {
    fn tracks(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn LocalTrack>)
            .collect()
    }
}

#[derive(Default)]
pub struct FakeMedia {
    pub deny: AtomicBool,
    pub captured: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeMedia {
    pub fn all_tracks_stopped(&self) -> bool {
        self.captured.lock().unwrap().iter().all(|t| t.stopped())
    }
}

#[async_trait]
impl MediaDevices for FakeMedia {
    async fn capture_audio(&self) -> Result<Arc<dyn CaptureStream>, VoiceError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VoiceError::MediaPermission(
                "NotAllowedError: Permission denied".to_string(),
            ));
        }
        let track = Arc::new(FakeTrack {
            id: "mic-0".to_string(),
            ..Default::default()
        });
        self.captured.lock().unwrap().push(track.clone());
        Ok(Arc::new(FakeStream {
            tracks: vec![track],
        }))
    }
}

// ── Peer ──

#[derive(Default)]
pub struct FakeChannel {
    pub label: String,
    pub open: AtomicBool,
    pub closed: AtomicBool,
    pub sent: Mutex<Vec<String>>,
}

impl ControlChannel for FakeChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, text: &str) -> Result<(), VoiceError> {
        if !self.is_open() {
            return Err(VoiceError::Channel("channel not open".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeRemoteTrack(pub String);

impl RemoteTrack for FakeRemoteTrack {
    fn id(&self) -> String {
        self.0.clone()
    }
}

pub struct FakePeer {
    pub events: mpsc::UnboundedSender<PeerEvent>,
    pub auto_open: bool,
    pub ice_servers: Vec<IceServer>,
    pub closes: AtomicUsize,
    pub added_tracks: Mutex<Vec<String>>,
    pub channel: Mutex<Option<Arc<FakeChannel>>>,
    pub offer: Mutex<Option<String>>,
    pub local: Mutex<Option<String>>,
    pub remote: Mutex<Option<String>>,
}

impl FakePeer {
    pub fn channel(&self) -> Option<Arc<FakeChannel>> {
        self.channel.lock().unwrap().clone()
    }

    /// Simulates the control channel finishing its handshake.
    pub fn open_channel(&self) {
        if let Some(channel) = self.channel() {
            channel.open.store(true, Ordering::SeqCst);
        }
        let _ = self.events.send(PeerEvent::ControlOpen);
    }

    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<(), VoiceError> {
        self.added_tracks.lock().unwrap().push(track.id());
        Ok(())
    }

    fn create_control_channel(&self, label: &str) -> Result<Arc<dyn ControlChannel>, VoiceError> {
        let channel = Arc::new(FakeChannel {
            label: label.to_string(),
            ..Default::default()
        });
        *self.channel.lock().unwrap() = Some(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self, options: OfferOptions) -> Result<String, VoiceError> {
        let mut sdp = String::from("v=0\r\n");
        if options.receive_audio {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=sendrecv\r\n");
        }
        if self.channel().is_some() {
            sdp.push_str("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n");
        }
        *self.offer.lock().unwrap() = Some(sdp.clone());
        Ok(sdp)
    }

    async fn set_local_description(&self, sdp: &str) -> Result<(), VoiceError> {
        *self.local.lock().unwrap() = Some(sdp.to_string());
        Ok(())
    }

    async fn set_remote_description(&self, sdp: &str) -> Result<(), VoiceError> {
        *self.remote.lock().unwrap() = Some(sdp.to_string());
        self.emit(PeerEvent::RemoteTrack(Arc::new(FakeRemoteTrack(
            "remote-audio".to_string(),
        ))));
        if self.auto_open {
            self.open_channel();
        }
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(channel) = self.channel() {
            channel.open.store(false, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub manual_open: AtomicBool,
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeConnector {
    pub fn last_peer(&self) -> Arc<FakePeer> {
        self.peers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no peer was created")
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::UnboundedReceiver<PeerEvent>), VoiceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(FakePeer {
            events: tx,
            auto_open: !self.manual_open.load(Ordering::SeqCst),
            ice_servers: ice_servers.to_vec(),
            closes: AtomicUsize::new(0),
            added_tracks: Mutex::new(Vec::new()),
            channel: Mutex::new(None),
            offer: Mutex::new(None),
            local: Mutex::new(None),
            remote: Mutex::new(None),
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok((peer, rx))
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub block_playback: AtomicBool,
    pub attached: Mutex<Vec<String>>,
    pub plays: AtomicUsize,
    pub detaches: AtomicUsize,
}

#[async_trait]
impl AudioSink for FakeSink {
    fn attach(&self, track: Arc<dyn RemoteTrack>) {
        self.attached.lock().unwrap().push(track.id());
    }

    async fn play(&self) -> Result<(), VoiceError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.block_playback.load(Ordering::SeqCst) {
            return Err(VoiceError::Playback(
                "NotAllowedError: play() requires a user gesture".to_string(),
            ));
        }
        Ok(())
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Rig {
    pub media: Arc<FakeMedia>,
    pub connector: Arc<FakeConnector>,
    pub sink: Arc<FakeSink>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            media: Arc::new(FakeMedia::default()),
            connector: Arc::new(FakeConnector::default()),
            sink: Arc::new(FakeSink::default()),
        }
    }

    pub fn devices(&self) -> VoiceDevices {
        VoiceDevices {
            media: self.media.clone(),
            connector: self.connector.clone(),
            sink: self.sink.clone(),
        }
    }
}

// ── Broker + speech service ──

pub const ANSWER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";

pub struct FakeRemote {
    pub token_body: Mutex<Value>,
    pub token_status: Mutex<StatusCode>,
    pub sdp_status: Mutex<StatusCode>,
    pub sdp_body: Mutex<String>,
    pub token_calls: AtomicUsize,
    pub sdp_calls: AtomicUsize,
    pub seen_voice: Mutex<Option<String>>,
    pub seen_auth: Mutex<Option<String>>,
    pub seen_content_type: Mutex<Option<String>>,
    pub seen_offer: Mutex<Option<String>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            token_body: Mutex::new(json!({"client_secret": {"value": "ek_test_123"}})),
            token_status: Mutex::new(StatusCode::OK),
            sdp_status: Mutex::new(StatusCode::CREATED),
            sdp_body: Mutex::new(ANSWER_SDP.to_string()),
            token_calls: AtomicUsize::new(0),
            sdp_calls: AtomicUsize::new(0),
            seen_voice: Mutex::new(None),
            seen_auth: Mutex::new(None),
            seen_content_type: Mutex::new(None),
            seen_offer: Mutex::new(None),
        }
    }
}

async fn token_handler(
    State(remote): State<Arc<FakeRemote>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    remote.token_calls.fetch_add(1, Ordering::SeqCst);
    *remote.seen_voice.lock().unwrap() = body["voice"].as_str().map(str::to_string);
    let status = *remote.token_status.lock().unwrap();
    let body = remote.token_body.lock().unwrap().clone();
    (status, Json(body))
}

async fn sdp_handler(
    State(remote): State<Arc<FakeRemote>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    remote.sdp_calls.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    *remote.seen_auth.lock().unwrap() = header("authorization");
    *remote.seen_content_type.lock().unwrap() = header("content-type");
    *remote.seen_offer.lock().unwrap() = Some(body);
    let status = *remote.sdp_status.lock().unwrap();
    let answer = remote.sdp_body.lock().unwrap().clone();
    (status, answer)
}

/// Serves `/voice/token` and `/realtime` on an ephemeral port.
pub async fn spawn_remote(remote: Arc<FakeRemote>) -> String {
    let app = Router::new()
        .route("/voice/token", post(token_handler))
        .route("/realtime", post(sdp_handler))
        .with_state(remote);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake remote");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake remote server");
    });
    format!("http://{}", addr)
}

pub fn config_for(base: &str) -> VoiceConfig {
    let mut config = VoiceConfig::new(format!("{}/voice/token", base), format!("{}/realtime", base));
    config.open_timeout_secs = 2;
    config.request_timeout_secs = 5;
    config
}
