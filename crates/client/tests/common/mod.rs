//! In-process fake of the Loners API and its Socket.IO endpoint

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use loners_client::{ApiClient, ClientConfig, LocalStore, SessionStore};
use loners_protocol::{EnginePacket, SocketPacket, User};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

pub const VALID_REFRESH: &str = "r-valid";
pub const INITIAL_ACCESS: &str = "a-1";
pub const FRESH_ACCESS: &str = "a-fresh";

/// A text frame the fake socket server received after the connect handshake
#[derive(Debug, Clone)]
pub struct Frame {
    pub conn: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum Control {
    Send(String),
    DropAll,
}

pub struct FakeState {
    pub valid_access: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub unread_calls: AtomicUsize,
    pub rooms_calls: AtomicUsize,
    pub connections: AtomicUsize,
    pub mark_read: Mutex<Vec<String>>,
    pub seen_auth: Mutex<Vec<Option<String>>>,
    /// Advertised in the Engine.IO open packet; the fake never pings
    pub ping_interval_ms: AtomicU64,
    pub ping_timeout_ms: AtomicU64,
    frames: mpsc::UnboundedSender<Frame>,
    control: broadcast::Sender<Control>,
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
    pub frames: mpsc::UnboundedReceiver<Frame>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(16);
        let state = Arc::new(FakeState {
            valid_access: Mutex::new(INITIAL_ACCESS.to_string()),
            refresh_calls: AtomicUsize::new(0),
            unread_calls: AtomicUsize::new(0),
            rooms_calls: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            mark_read: Mutex::new(Vec::new()),
            seen_auth: Mutex::new(Vec::new()),
            ping_interval_ms: AtomicU64::new(25_000),
            ping_timeout_ms: AtomicU64::new(20_000),
            frames: frames_tx,
            control,
        });

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/notifications/unread", get(unread))
            .route("/api/notifications/mark-read/{room}", post(mark_read))
            .route("/api/chat/rooms", get(rooms))
            .route("/api/chat/{room}", get(history))
            .route("/api/events/nearby", get(nearby))
            .route("/api/users/me", put(update_me))
            .route("/socket.io/", get(socket_io))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            frames,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::with_data_dir("/nonexistent/loners");
        config.api_url = format!("http://{}/api", self.addr);
        config.socket_url = format!("http://{}", self.addr);
        config.reconnect_min = Duration::from_millis(50);
        config.reconnect_max = Duration::from_millis(200);
        config.keepalive_interval = Duration::from_secs(60);
        config
    }

    /// Fresh in-memory session plus an API client bound to this server
    pub fn client(&self) -> (Arc<SessionStore>, ApiClient) {
        let session = Arc::new(SessionStore::restore(Arc::new(LocalStore::in_memory())));
        let api = ApiClient::new(&self.config(), session.clone()).unwrap();
        (session, api)
    }

    /// Push a raw Engine.IO frame to every open socket
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.state.control.send(Control::Send(frame.into()));
    }

    pub fn push_event(&self, name: &str, args: Vec<Value>) {
        self.push_frame(SocketPacket::event(name, args).to_frame());
    }

    pub fn drop_connections(&self) {
        let _ = self.state.control.send(Control::DropAll);
    }

    /// Ping window advertised to sockets opened from now on
    pub fn set_ping_window(&self, interval: Duration, timeout: Duration) {
        self.state
            .ping_interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
        self.state
            .ping_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    /// Next raw frame from a client, whatever its type
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("fake server stopped")
    }

    /// Next Socket.IO event from a client, skipping keepalive pings
    pub async fn next_event(&mut self) -> (usize, String, Vec<Value>) {
        loop {
            let frame = self.next_frame().await;
            let EnginePacket::Message(payload) = EnginePacket::decode(&frame.text).unwrap() else {
                continue;
            };
            if let SocketPacket::Event { name, args, .. } = SocketPacket::decode(&payload).unwrap()
            {
                if name != "ping" {
                    return (frame.conn, name, args);
                }
            }
        }
    }
}

pub fn user(id: &str, username: &str) -> User {
    serde_json::from_value(json!({"_id": id, "username": username})).unwrap()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn authorized(state: &FakeState, headers: &HeaderMap) -> bool {
    let expected = state.valid_access.lock().unwrap().clone();
    bearer(headers).as_deref() == Some(expected.as_str())
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": message}))).into_response()
}

async fn login(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return unauthorized("Identifiants invalides");
    }
    let access = state.valid_access.lock().unwrap().clone();
    Json(json!({
        "user": {"_id": "u1", "username": "ana", "email": body["email"]},
        "token": access,
        "refreshToken": VALID_REFRESH,
    }))
    .into_response()
}

async fn refresh(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if body["refreshToken"] != VALID_REFRESH {
        return unauthorized("Invalid refresh token");
    }
    *state.valid_access.lock().unwrap() = FRESH_ACCESS.to_string();
    Json(json!({"token": FRESH_ACCESS})).into_response()
}

async fn unread(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.unread_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return unauthorized("Token expired");
    }
    Json(json!([
        {"_id": "n1", "event": "A"},
        {"_id": "n2", "event": "A"},
        {"_id": "n3", "event": "B"}
    ]))
    .into_response()
}

async fn mark_read(
    State(state): State<Arc<FakeState>>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized("Token expired");
    }
    state.mark_read.lock().unwrap().push(room);
    Json(json!({"ok": true})).into_response()
}

/// Rejects every token, to exercise the no-second-refresh rule
async fn rooms(State(state): State<Arc<FakeState>>) -> Response {
    state.rooms_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized("Forbidden room list")
}

async fn history(Path(room): Path<String>) -> Response {
    Json(json!({
        "messages": [
            {"_id": "m1", "event": room, "sender": {"_id": "u2", "username": "bo"}, "text": "first"}
        ]
    }))
    .into_response()
}

async fn nearby(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.seen_auth.lock().unwrap().push(bearer(&headers));
    Json(json!([{"_id": "e1", "name": "Jazz night", "attendees": []}])).into_response()
}

async fn update_me(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized("Token expired");
    }
    Json(json!({"_id": "u1", "username": body["username"], "avatarUrl": body["avatarUrl"]}))
        .into_response()
}

async fn socket_io(ws: WebSocketUpgrade, State(state): State<Arc<FakeState>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: Arc<FakeState>) {
    let conn = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut control = state.control.subscribe();
    let (mut tx, mut rx) = socket.split();

    let open = format!(
        r#"0{{"sid":"eio","upgrades":[],"pingInterval":{},"pingTimeout":{}}}"#,
        state.ping_interval_ms.load(Ordering::SeqCst),
        state.ping_timeout_ms.load(Ordering::SeqCst),
    );
    if tx.send(Message::Text(open.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = rx.next() => {
                let Some(Ok(Message::Text(text))) = incoming else {
                    return;
                };
                let text = text.as_str().to_string();
                if text == "40" {
                    let ack = format!("40{{\"sid\":\"s-{conn}\"}}");
                    if tx.send(Message::Text(ack.into())).await.is_err() {
                        return;
                    }
                    continue;
                }
                let _ = state.frames.send(Frame { conn, text });
            }
            command = control.recv() => match command {
                Ok(Control::Send(frame)) => {
                    if tx.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Control::DropAll) | Err(_) => return,
            }
        }
    }
}
