//! Scriptable in-memory backend and an axum-served HTTP backend.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use intake_bridge::config::BridgeConfig;
use intake_bridge::{Activity, BackendApi, ClientError, SessionBridge, UploadFile};
use intake_db::MemorySessionStore;
use intake_types::wire::{ChatRequest, ChatResponse, HistoryResponse};
use intake_types::AttachmentKind;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// ── In-memory backend ──

/// What the next `/chat` call answers with.
#[derive(Clone)]
pub enum ChatScript {
    Reply(Value),
    Fail(u16, &'static str),
}

#[derive(Clone)]
pub enum HistoryScript {
    Found(Value),
    Fail(u16),
}

#[derive(Clone)]
pub struct UploadCall {
    pub name: String,
    pub kind: AttachmentKind,
    pub case_id: String,
}

/// A [`BackendApi`] whose answers are scripted per call. Each endpoint can be
/// gated so a test can hold a request open.
pub struct FakeBackend {
    pub chat_script: Mutex<VecDeque<ChatScript>>,
    pub default_reply: Mutex<Value>,
    pub chat_calls: Mutex<Vec<ChatRequest>>,
    pub chat_gate: Option<Arc<Semaphore>>,

    pub histories: Mutex<HashMap<String, HistoryScript>>,
    pub history_calls: Mutex<Vec<String>>,
    pub history_gate: Option<Arc<Semaphore>>,
    pub history_in_flight: AtomicUsize,
    pub history_max_in_flight: AtomicUsize,

    pub upload_url: Mutex<Result<String, u16>>,
    pub upload_calls: Mutex<Vec<UploadCall>>,
    pub upload_gate: Option<Arc<Semaphore>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            chat_script: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(json!({"reply": "ok", "session_id": "sess-1"})),
            chat_calls: Mutex::new(Vec::new()),
            chat_gate: None,
            histories: Mutex::new(HashMap::new()),
            history_calls: Mutex::new(Vec::new()),
            history_gate: None,
            history_in_flight: AtomicUsize::new(0),
            history_max_in_flight: AtomicUsize::new(0),
            upload_url: Mutex::new(Ok("https://files.example/upload.bin".to_string())),
            upload_calls: Mutex::new(Vec::new()),
            upload_gate: None,
        }
    }
}

impl FakeBackend {
    pub fn gated_chat() -> Self {
        Self {
            chat_gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn gated_history() -> Self {
        Self {
            history_gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn gated_upload() -> Self {
        Self {
            upload_gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn script_chat(&self, step: ChatScript) {
        self.chat_script.lock().unwrap().push_back(step);
    }

    pub fn set_history(&self, session_id: &str, script: HistoryScript) {
        self.histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), script);
    }

    pub fn chat_count(&self) -> usize {
        self.chat_calls.lock().unwrap().len()
    }

    pub fn last_chat(&self) -> ChatRequest {
        self.chat_calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no chat request was made")
    }

    pub fn release_chat(&self, n: usize) {
        self.chat_gate.as_ref().expect("chat is not gated").add_permits(n);
    }

    pub fn release_history(&self, n: usize) {
        self.history_gate
            .as_ref()
            .expect("history is not gated")
            .add_permits(n);
    }

    pub fn release_upload(&self, n: usize) {
        self.upload_gate
            .as_ref()
            .expect("upload is not gated")
            .add_permits(n);
    }
}

async fn pass(gate: &Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.expect("gate closed").forget();
    }
}

fn status(code: u16, message: &str) -> ClientError {
    ClientError::Status {
        status: code,
        message: message.to_string(),
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        self.chat_calls.lock().unwrap().push(request.clone());
        pass(&self.chat_gate).await;
        let step = self.chat_script.lock().unwrap().pop_front();
        let body = match step {
            Some(ChatScript::Reply(body)) => body,
            Some(ChatScript::Fail(code, message)) => return Err(status(code, message)),
            None => self.default_reply.lock().unwrap().clone(),
        };
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn fetch_history(&self, session_id: &str) -> Result<HistoryResponse, ClientError> {
        self.history_calls.lock().unwrap().push(session_id.to_string());
        let now = self.history_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.history_max_in_flight.fetch_max(now, Ordering::SeqCst);
        pass(&self.history_gate).await;
        self.history_in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.histories.lock().unwrap().get(session_id).cloned();
        match script {
            Some(HistoryScript::Found(body)) => {
                serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
            }
            Some(HistoryScript::Fail(code)) => Err(status(code, "history unavailable")),
            None => Err(status(404, "session not found")),
        }
    }

    async fn upload(
        &self,
        file: &UploadFile,
        kind: &AttachmentKind,
        case_id: &str,
    ) -> Result<String, ClientError> {
        self.upload_calls.lock().unwrap().push(UploadCall {
            name: file.name.clone(),
            kind: kind.clone(),
            case_id: case_id.to_string(),
        });
        pass(&self.upload_gate).await;
        self.upload_url
            .lock()
            .unwrap()
            .clone()
            .map_err(|code| status(code, "storage unavailable"))
    }
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        idle_wait_ms: 2_000,
        max_upload_bytes: 1024,
        ..BridgeConfig::default()
    }
}

pub fn bridge_with(
    backend: Arc<FakeBackend>,
    store: Arc<MemorySessionStore>,
    config: BridgeConfig,
) -> SessionBridge {
    SessionBridge::new(backend, store, config)
}

pub fn fresh_bridge(backend: Arc<FakeBackend>) -> (SessionBridge, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    (
        bridge_with(backend, store.clone(), test_config()),
        store,
    )
}

/// Waits until the bridge lane reaches `activity`.
pub async fn wait_for_activity(bridge: &SessionBridge, activity: Activity) {
    let mut rx = bridge.subscribe_activity();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|a| *a == activity))
        .await
        .expect("timed out waiting for activity")
        .expect("activity channel closed");
}

/// Waits until `check` holds, polling briefly.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn jpeg(name: &str) -> UploadFile {
    UploadFile::new(name, vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
}

// ── HTTP backend ──

#[derive(Default)]
pub struct HttpState {
    pub chats: Mutex<Vec<Value>>,
    pub uploads: Mutex<Vec<HashMap<String, String>>>,
    pub upload_body: Mutex<Option<Value>>,
    pub chat_status: Mutex<Option<(StatusCode, Value)>>,
}

async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.chats.lock().unwrap().push(body.clone());
    if let Some((code, body)) = state.chat_status.lock().unwrap().clone() {
        return (code, Json(body));
    }
    let session_id = body["session_id"].as_str().unwrap_or("case-http-1").to_string();
    let reply = match body["attachments"].as_array() {
        Some(items) if !items.is_empty() => json!({
            "reply": "Thanks, got your document.",
            "session_id": session_id,
            "next": "capture_signature",
            "followups": [{"type": "witness_signature", "status": "pending"}]
        }),
        _ => json!({
            "reply": format!("echo: {}", body["message"].as_str().unwrap_or_default()),
            "session_id": session_id,
            "next": "upload_photo_id"
        }),
    };
    (StatusCode::OK, Json(reply))
}

async fn history_handler(Path(session_id): Path<String>) -> impl IntoResponse {
    if session_id != "case 7/b" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown session"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "messages": [
                {"role": "system", "message": "case opened"},
                {"role": "user", "message": "hello"},
                {"role": "assistant", "message": "Please upload your ID.",
                 "meta": {"next": "upload_photo_id", "followups": [{"type": "photo_id"}]}}
            ]
        })),
    )
}

async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut fields = HashMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map(|b| b.len()).unwrap_or_default();
            fields.insert("file_name".to_string(), file_name);
            fields.insert("file_type".to_string(), content_type);
            fields.insert("file_len".to_string(), bytes.to_string());
        } else {
            let value = field.text().await.unwrap_or_default();
            fields.insert(name, value);
        }
    }
    state.uploads.lock().unwrap().push(fields);
    let body = state
        .upload_body
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| json!({"fileUrl": "https://x/y.jpg"}));
    (StatusCode::OK, Json(body))
}

/// Serves `/chat`, `/chat/history/{id}` and `/upload` on an ephemeral port.
pub async fn spawn_http_backend(state: Arc<HttpState>) -> String {
    let app = Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/history/{session_id}", get(history_handler))
        .route("/upload", post(upload_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend server");
    });
    format!("http://{}", addr)
}
