// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: an in-process karaoke backend fixture.
//!
//! Serves the auth endpoints, a couple of domain resources, and the
//! realtime WebSocket over a real listener so integration tests exercise
//! the same code paths as a deployed backend. Tests drive fixture state
//! directly: expire tokens, fail refreshes, inject presence events, and
//! inspect the frames the client actually sent.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::storage::{Storage, StorageError};

/// In-memory storage with an adjustable byte quota.
///
/// The quota counts the summed byte length of all keys and values,
/// approximating the serialized size a browser storage quota bounds.
pub struct MemStore {
    map: Mutex<HashMap<String, String>>,
    quota: Mutex<Option<usize>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self { map: Mutex::new(HashMap::new()), quota: Mutex::new(None) }
    }

    pub fn with_quota(quota: usize) -> Self {
        Self { map: Mutex::new(HashMap::new()), quota: Mutex::new(Some(quota)) }
    }

    /// Impose (or lift) the quota after the store has been seeded.
    pub fn set_quota(&self, quota: Option<usize>) {
        *self.quota.lock() = quota;
    }

    /// Current summed byte length of all keys and values.
    pub fn used_bytes(&self) -> usize {
        self.map.lock().iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Storage for MemStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        let prev = map.insert(key.to_owned(), value.to_owned());
        if let Some(quota) = *self.quota.lock() {
            let used: usize = map.iter().map(|(k, v)| k.len() + v.len()).sum();
            if used > quota {
                match prev {
                    Some(p) => map.insert(key.to_owned(), p),
                    None => map.remove(key),
                };
                return Err(StorageError::QuotaExceeded { needed: used, quota });
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.map.lock().remove(key);
    }
}

/// A scripted backend account.
#[derive(Debug, Clone)]
pub struct FixtureUser {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role: String,
}

/// Shared fixture state, inspectable from tests.
pub struct FixtureState {
    users: Vec<FixtureUser>,
    online: Mutex<Vec<(u64, String)>>,
    histories: Mutex<HashMap<u64, Vec<Value>>>,
    valid_tokens: Mutex<HashSet<String>>,
    valid_refresh: Mutex<HashSet<String>>,
    refresh_calls: AtomicU32,
    refresh_fails: AtomicBool,
    logout_calls: AtomicU32,
    token_seq: AtomicU64,
    message_seq: AtomicU64,
    recorded: Mutex<Vec<Value>>,
    inject_tx: broadcast::Sender<String>,
}

impl FixtureState {
    fn find_user(&self, username: &str) -> Option<&FixtureUser> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Mint an access token shaped like the backend's JWTs (unsigned;
    /// the client never verifies signatures).
    fn mint_access(&self, user: &FixtureUser, exp: Option<u64>) -> String {
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let mut claims = json!({
            "id": user.id,
            "username": user.username,
            "role": user.role,
            "seq": seq,
        });
        if let Some(exp) = exp {
            claims["exp"] = json!(exp);
        }
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let token = format!("{header}.{payload}.sig");
        self.valid_tokens.lock().insert(token.clone());
        token
    }

    fn mint_refresh(&self, user: &FixtureUser) -> String {
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed);
        let token = format!("refresh-{}-{seq}", user.username);
        self.valid_refresh.lock().insert(token.clone());
        token
    }

    fn bearer_user_id(&self, headers: &HeaderMap) -> Option<u64> {
        let header = headers.get("authorization")?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?;
        if !self.valid_tokens.lock().contains(token) {
            return None;
        }
        crate::session::claims::decode_claims(token)?.user_id
    }
}

/// Handle to a running fixture.
pub struct KaraokeFixture {
    pub state: Arc<FixtureState>,
    addr: SocketAddr,
}

impl KaraokeFixture {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Invalidate every outstanding access token; the next authorized
    /// request fails with 403 and triggers the refresh protocol.
    pub fn expire_access_tokens(&self) {
        self.state.valid_tokens.lock().clear();
    }

    pub fn set_refresh_fails(&self, fails: bool) {
        self.state.refresh_fails.store(fails, Ordering::Relaxed);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn logout_calls(&self) -> u32 {
        self.state.logout_calls.load(Ordering::Relaxed)
    }

    /// Frames received from clients on the realtime channel, in order.
    pub fn recorded_events(&self) -> Vec<Value> {
        self.state.recorded.lock().clone()
    }

    /// Broadcast a raw event to every connected realtime client.
    pub fn push_event(&self, event: Value) {
        let _ = self.state.inject_tx.send(event.to_string());
    }

    /// Mint a registered token out of band (for pre-seeding storage).
    pub fn token_for(&self, username: &str, exp: Option<u64>) -> Option<String> {
        let user = self.state.find_user(username)?.clone();
        Some(self.state.mint_access(&user, exp))
    }
}

/// Builder for a fixture with scripted accounts, presence, and history.
pub struct KaraokeFixtureBuilder {
    users: Vec<FixtureUser>,
    online: Vec<(u64, String)>,
    histories: HashMap<u64, Vec<Value>>,
}

impl Default for KaraokeFixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KaraokeFixtureBuilder {
    pub fn new() -> Self {
        Self { users: Vec::new(), online: Vec::new(), histories: HashMap::new() }
    }

    pub fn user(
        mut self,
        id: u64,
        username: impl Into<String>,
        password: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        self.users.push(FixtureUser {
            id,
            username: username.into(),
            password: password.into(),
            role: role.into(),
        });
        self
    }

    pub fn online(mut self, id: u64, username: impl Into<String>) -> Self {
        self.online.push((id, username.into()));
        self
    }

    /// Scripted DM history replayed on `chat:dm:open` for this peer.
    pub fn history(mut self, peer_id: u64, messages: Vec<Value>) -> Self {
        self.histories.insert(peer_id, messages);
        self
    }

    /// Bind an ephemeral port and serve the fixture.
    pub async fn spawn(self) -> anyhow::Result<KaraokeFixture> {
        let (inject_tx, _) = broadcast::channel(64);
        let state = Arc::new(FixtureState {
            users: self.users,
            online: Mutex::new(self.online),
            histories: Mutex::new(self.histories),
            valid_tokens: Mutex::new(HashSet::new()),
            valid_refresh: Mutex::new(HashSet::new()),
            refresh_calls: AtomicU32::new(0),
            refresh_fails: AtomicBool::new(false),
            logout_calls: AtomicU32::new(0),
            token_seq: AtomicU64::new(0),
            message_seq: AtomicU64::new(0),
            recorded: Mutex::new(Vec::new()),
            inject_tx,
        });

        let router = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/token", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/users/me", get(me))
            .route("/songs/queue", get(song_queue))
            .route("/songs/queue/{id}", delete(cancel_request))
            .route("/leaderboard", get(leaderboard))
            .route("/ws", get(ws_handler))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(KaraokeFixture { state, addr })
    }
}

// -- HTTP handlers ------------------------------------------------------------

async fn login(
    State(state): State<Arc<FixtureState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let username = body.get("username").and_then(|v| v.as_str()).unwrap_or_default();
    let password = body.get("password").and_then(|v| v.as_str()).unwrap_or_default();

    match state.find_user(username).cloned() {
        Some(user) if user.password == password => {
            let token = state.mint_access(&user, None);
            let refresh_token = state.mint_refresh(&user);
            (
                StatusCode::OK,
                Json(json!({
                    "token": token,
                    "refreshToken": refresh_token,
                    "ruolo": user.role,
                })),
            )
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid credentials"}))),
    }
}

async fn refresh(
    State(state): State<Arc<FixtureState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.refresh_calls.fetch_add(1, Ordering::Relaxed);

    if state.refresh_fails.load(Ordering::Relaxed) {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "refresh rejected"})));
    }
    let refresh_token = body.get("refreshToken").and_then(|v| v.as_str()).unwrap_or_default();
    if !state.valid_refresh.lock().contains(refresh_token) {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "unknown refresh token"})));
    }

    // The refresh token encodes its account name.
    let username = refresh_token
        .strip_prefix("refresh-")
        .and_then(|rest| rest.rsplit_once('-'))
        .map(|(name, _)| name)
        .unwrap_or_default();
    match state.find_user(username).cloned() {
        Some(user) => {
            let token = state.mint_access(&user, None);
            (StatusCode::OK, Json(json!({"token": token})))
        }
        None => (StatusCode::FORBIDDEN, Json(json!({"error": "unknown account"}))),
    }
}

async fn logout(
    State(state): State<Arc<FixtureState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.logout_calls.fetch_add(1, Ordering::Relaxed);
    if let Some(refresh_token) = body.get("refreshToken").and_then(|v| v.as_str()) {
        state.valid_refresh.lock().remove(refresh_token);
    }
    Json(json!({}))
}

async fn me(State(state): State<Arc<FixtureState>>, headers: HeaderMap) -> impl IntoResponse {
    match state.bearer_user_id(&headers) {
        Some(id) => match state.users.iter().find(|u| u.id == id) {
            Some(user) => (
                StatusCode::OK,
                Json(json!({
                    "id": user.id,
                    "username": user.username,
                    "role": user.role,
                })),
            ),
            None => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown user"}))),
        },
        None => (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))),
    }
}

async fn song_queue(
    State(state): State<Arc<FixtureState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match state.bearer_user_id(&headers) {
        Some(_) => (StatusCode::OK, Json(json!([]))),
        None => (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))),
    }
}

async fn cancel_request(
    State(state): State<Arc<FixtureState>>,
    Path(_id): Path<u64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match state.bearer_user_id(&headers) {
        Some(_) => (StatusCode::OK, Json(json!({}))),
        None => (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))),
    }
}

async fn leaderboard(
    State(state): State<Arc<FixtureState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match state.bearer_user_id(&headers) {
        Some(_) => (
            StatusCode::OK,
            Json(json!([
                {"userId": 7, "username": "ada", "points": 420},
                {"userId": 42, "username": "bea", "points": 390},
            ])),
        ),
        None => (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"}))),
    }
}

// -- Realtime -----------------------------------------------------------------

async fn ws_handler(
    State(state): State<Arc<FixtureState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let user_id = query
        .get("token")
        .filter(|t| state.valid_tokens.lock().contains(*t))
        .and_then(|t| crate::session::claims::decode_claims(t))
        .and_then(|c| c.user_id);

    let Some(user_id) = user_id else {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };

    ws.on_upgrade(move |socket| handle_ws(socket, state, user_id))
}

async fn handle_ws(socket: WebSocket, state: Arc<FixtureState>, user_id: u64) {
    let mut inject_rx = state.inject_tx.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            injected = inject_rx.recv() => {
                match injected {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => continue,
                };
                let Ok(msg) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                state.recorded.lock().push(msg.clone());

                let replies = handle_client_event(&state, user_id, &msg);
                let mut closed = false;
                for reply in replies {
                    if ws_tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                        closed = true;
                        break;
                    }
                }
                if closed {
                    break;
                }
            }
        }
    }
}

/// Scripted server behavior for one inbound client event.
fn handle_client_event(state: &FixtureState, user_id: u64, msg: &Value) -> Vec<Value> {
    let event = msg.get("event").and_then(|v| v.as_str()).unwrap_or_default();
    match event {
        "presence:get" => {
            let users: Vec<Value> = state
                .online
                .lock()
                .iter()
                .map(|(id, username)| json!({"id": id, "username": username}))
                .collect();
            vec![json!({"event": "users:list", "users": users})]
        }
        "chat:dm:open" => {
            let peer_id = msg.get("peerId").and_then(|v| v.as_u64()).unwrap_or(0);
            let messages = state.histories.lock().get(&peer_id).cloned().unwrap_or_default();
            vec![json!({"event": "chat:dm:history", "peerId": peer_id, "messages": messages})]
        }
        "chat:send" => {
            let to = msg.get("to").and_then(|v| v.as_u64()).unwrap_or(0);
            let text = msg.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            let id = format!("m{}", state.message_seq.fetch_add(1, Ordering::Relaxed) + 1);
            let time = crate::chat::message::epoch_ms();
            // The backend double-publishes DMs under a generic and a
            // DM-specific event name with the same id.
            vec![
                json!({
                    "event": "chat:message",
                    "id": id,
                    "fromUserId": user_id,
                    "toUserId": to,
                    "text": text,
                    "time": time,
                }),
                json!({
                    "event": "chat:dm:message",
                    "id": id,
                    "fromUserId": user_id,
                    "toUserId": to,
                    "text": text,
                    "time": time,
                }),
            ]
        }
        _ => Vec::new(),
    }
}
