// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serata: headless client core for the karaoke-night booking service.
//!
//! Auth session with coalesced token refresh, realtime presence and
//! direct-message chat over WebSocket, durable client-side conversation
//! storage, and thin typed clients for the domain resources.

pub mod chat;
pub mod config;
pub mod domain;
pub mod error;
pub mod presence;
pub mod session;
pub mod storage;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use crate::chat::{DmRouter, ThreadStore};
use crate::config::ClientConfig;
use crate::presence::PresenceTracker;
use crate::session::AuthSession;
use crate::storage::{FileStore, Storage};
use crate::transport::{ApiClient, RealtimeConnection};

/// A fully wired client: session, authorized API, realtime channel,
/// presence tracker, and DM router.
pub struct Client {
    pub session: Arc<AuthSession>,
    pub api: Arc<ApiClient>,
    pub conn: Arc<RealtimeConnection>,
    pub presence: Arc<PresenceTracker>,
    pub router: Arc<DmRouter>,
}

/// Wire all components for a logged-in session and connect the realtime
/// channel. The session must already hold an access token.
pub fn connect(config: &ClientConfig, session: Arc<AuthSession>) -> anyhow::Result<Client> {
    let token = session
        .access_token()
        .ok_or_else(|| anyhow::anyhow!("cannot connect without a login"))?;

    let api = Arc::new(ApiClient::new(
        &config.server_url,
        Arc::clone(&session),
        config.request_timeout(),
    ));

    let conn = Arc::new(RealtimeConnection::connect(
        &config.ws_url(),
        &token,
        config.reconnect_interval(),
    ));

    let presence = Arc::new(PresenceTracker::new(conn.local_id()));
    presence.attach(conn.subscribe());

    // Thread storage is namespaced by the local user id; fall back to 0
    // only when the token payload is opaque.
    let user_id = conn.local_id().or_else(|| session.user_id()).unwrap_or(0);
    let store = Arc::new(ThreadStore::load(
        Arc::clone(session.storage()),
        user_id,
        config.thread_cap,
    ));
    let router = DmRouter::new(Arc::clone(&conn), store);

    Ok(Client { session, api, conn, presence, router })
}

/// Run the headless client until interrupted: log in (unless a stored
/// token is still valid), connect, and tail presence and chat events to
/// the log.
pub async fn run(config: ClientConfig, username: &str, password: &str) -> anyhow::Result<()> {
    let store_path = config.state_dir().join("client.json");
    let storage: Arc<dyn Storage> =
        Arc::new(FileStore::open(store_path, config.storage_quota)?);
    let session = Arc::new(AuthSession::new(&config.server_url, storage));

    if !session.is_logged_in() {
        session.login(username, password).await?;
    }

    let client = connect(&config, session)?;

    let mut roster = client.presence.subscribe();
    tokio::spawn(async move {
        while roster.changed().await.is_ok() {
            let online = roster.borrow_and_update().clone();
            tracing::info!(online = online.len(), "presence update");
        }
    });

    let mut messages = client.router.subscribe_messages();
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(msg) => {
                    let author = msg.author.clone().unwrap_or_else(|| msg.sender_id.to_string());
                    tracing::info!(from = %author, text = %msg.text, "message");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    client.conn.disconnect();
    Ok(())
}
