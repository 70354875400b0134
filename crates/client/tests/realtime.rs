// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime integration tests over real WebSocket connections: presence
//! convergence, DM routing, dedup, and unread accounting.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use serata::chat::ChatMessage;
use serata::config::ClientConfig;
use serata::session::AuthSession;
use serata::storage::{FileStore, Storage};
use serata::test_support::{KaraokeFixture, KaraokeFixtureBuilder};
use serata::Client;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

fn builder() -> KaraokeFixtureBuilder {
    KaraokeFixtureBuilder::new()
        .user(7, "ada", "segreta", "admin")
        .user(42, "bea", "canzone", "user")
}

fn test_config(fixture: &KaraokeFixture, dir: &std::path::Path) -> ClientConfig {
    ClientConfig {
        server_url: fixture.base_url(),
        state_dir: Some(dir.to_path_buf()),
        thread_cap: 200,
        reconnect_ms: 100,
        request_timeout_ms: 5000,
        storage_quota: None,
    }
}

/// Log in as `ada` and wire a full client against the fixture.
async fn connect_client(
    fixture: &KaraokeFixture,
    dir: &std::path::Path,
) -> anyhow::Result<Client> {
    let storage: Arc<dyn Storage> =
        Arc::new(FileStore::open(dir.join("client.json"), None)?);
    let session = Arc::new(AuthSession::new(fixture.base_url(), storage));
    session.login("ada", "segreta").await?;

    let config = test_config(fixture, dir);
    let client = serata::connect(&config, session)?;
    wait_live(&client).await?;
    Ok(client)
}

async fn wait_live(client: &Client) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !client.conn.is_live() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("realtime channel never came up");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Wait until the observed roster satisfies `pred`.
async fn wait_roster(
    client: &Client,
    pred: impl Fn(&[serata::presence::OnlineUser]) -> bool,
) -> anyhow::Result<()> {
    let mut rx = client.presence.subscribe();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if pred(&rx.borrow_and_update()) {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("roster never satisfied predicate: {:?}", client.presence.online());
        }
        let _ = tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
    }
}

/// Wait until the fixture has recorded a frame satisfying `pred`.
async fn wait_recorded(
    fixture: &KaraokeFixture,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if fixture.recorded_events().iter().any(&pred) {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("expected frame never recorded: {:?}", fixture.recorded_events());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn recv_message(
    rx: &mut broadcast::Receiver<ChatMessage>,
) -> anyhow::Result<ChatMessage> {
    let msg = tokio::time::timeout(WAIT, rx.recv())
        .await
        .map_err(|_| anyhow::anyhow!("message stream timed out"))??;
    Ok(msg)
}

// -- Presence -----------------------------------------------------------------

#[tokio::test]
async fn connect_requests_snapshot_and_filters_self() -> anyhow::Result<()> {
    let fixture = builder().online(1, "dj").online(7, "ada").spawn().await?;
    let dir = tempfile::tempdir()?;
    let client = connect_client(&fixture, dir.path()).await?;

    wait_roster(&client, |roster| {
        roster.len() == 1 && roster[0].id == 1 && roster[0].username == "dj"
    })
    .await?;
    assert!(client.presence.is_online(1));
    assert!(!client.presence.is_online(7), "own id is filtered");
    Ok(())
}

#[tokio::test]
async fn presence_deltas_update_roster() -> anyhow::Result<()> {
    let fixture = builder().online(1, "dj").spawn().await?;
    let dir = tempfile::tempdir()?;
    let client = connect_client(&fixture, dir.path()).await?;
    wait_roster(&client, |roster| roster.len() == 1).await?;

    fixture.push_event(json!({"event": "users:online", "user": {"id": 5, "username": "gigi"}}));
    wait_roster(&client, |roster| roster.iter().any(|u| u.id == 5)).await?;

    fixture.push_event(json!({"event": "users:offline", "id": 5}));
    wait_roster(&client, |roster| !roster.iter().any(|u| u.id == 5)).await?;

    // The unrelated peer was untouched throughout.
    assert!(client.presence.is_online(1));
    Ok(())
}

// -- Direct messages ----------------------------------------------------------

#[tokio::test]
async fn dm_send_echoes_exactly_once() -> anyhow::Result<()> {
    let fixture = builder().spawn().await?;
    let dir = tempfile::tempdir()?;
    let client = connect_client(&fixture, dir.path()).await?;
    let mut messages = client.router.subscribe_messages();

    client.router.select_peer(42);
    wait_recorded(&fixture, |f| f["event"] == "chat:dm:open" && f["peerId"] == 42).await?;

    assert!(client.router.send_text("hello"));
    wait_recorded(&fixture, |f| {
        f["event"] == "chat:send" && f["to"] == 42 && f["text"] == "hello"
    })
    .await?;

    // One normalized message despite the server double-publishing under
    // the DM-specific event name too.
    let msg = recv_message(&mut messages).await?;
    assert_eq!(msg.sender_id, 7);
    assert_eq!(msg.recipient_id, Some(42));
    assert_eq!(msg.text, "hello");

    let dup = tokio::time::timeout(QUIET, messages.recv()).await;
    assert!(dup.is_err(), "duplicate delivery: {dup:?}");

    let thread = client.router.store().thread(42);
    assert_eq!(thread.len(), 1);
    assert_eq!(client.router.store().unread(42), 0, "own echo is not unread");
    Ok(())
}

#[tokio::test]
async fn whitespace_send_produces_no_frame() -> anyhow::Result<()> {
    let fixture = builder().spawn().await?;
    let dir = tempfile::tempdir()?;
    let client = connect_client(&fixture, dir.path()).await?;

    client.router.select_peer(42);
    wait_recorded(&fixture, |f| f["event"] == "chat:dm:open").await?;

    assert!(!client.router.send_text("   \t  "));
    tokio::time::sleep(QUIET).await;
    let sends: Vec<_> = fixture
        .recorded_events()
        .into_iter()
        .filter(|f| f["event"] == "chat:send")
        .collect();
    assert!(sends.is_empty(), "unexpected frames: {sends:?}");
    Ok(())
}

#[tokio::test]
async fn history_bulk_load_feeds_the_unified_stream() -> anyhow::Result<()> {
    let history = vec![
        json!({"id": "h1", "fromUserId": 42, "toUserId": 7, "text": "ciao", "time": 100}),
        json!({"id": "h2", "fromUserId": 7, "toUserId": 42, "text": "ehi", "time": 200}),
    ];
    let fixture = builder().history(42, history).spawn().await?;
    let dir = tempfile::tempdir()?;
    let client = connect_client(&fixture, dir.path()).await?;
    let mut messages = client.router.subscribe_messages();

    client.router.select_peer(42);

    let first = recv_message(&mut messages).await?;
    let second = recv_message(&mut messages).await?;
    assert_eq!(first.id, "h1");
    assert_eq!(second.id, "h2");

    let thread = client.router.store().thread(42);
    assert_eq!(thread.len(), 2);

    // Re-opening replays the same history; known ids are not re-emitted.
    client.router.select_peer(42);
    let repeat = tokio::time::timeout(QUIET, messages.recv()).await;
    assert!(repeat.is_err(), "history was re-delivered: {repeat:?}");
    assert_eq!(client.router.store().thread(42).len(), 2);
    Ok(())
}

#[tokio::test]
async fn inbound_from_inactive_peer_counts_unread() -> anyhow::Result<()> {
    let fixture = builder().spawn().await?;
    let dir = tempfile::tempdir()?;
    let client = connect_client(&fixture, dir.path()).await?;
    let mut messages = client.router.subscribe_messages();

    client.router.select_peer(42);
    wait_recorded(&fixture, |f| f["event"] == "chat:dm:open").await?;

    // A message from a peer whose thread is not active.
    fixture.push_event(json!({
        "event": "chat:message", "id": "x1", "fromUserId": 5, "text": "yo", "time": 1
    }));
    let msg = recv_message(&mut messages).await?;
    assert_eq!(msg.sender_id, 5);
    assert_eq!(client.router.store().unread(5), 1);

    // Selecting that peer clears the counter.
    client.router.select_peer(5);
    assert_eq!(client.router.store().unread(5), 0);
    Ok(())
}

#[tokio::test]
async fn thread_persistence_survives_reconnect_of_the_client() -> anyhow::Result<()> {
    let fixture = builder().spawn().await?;
    let dir = tempfile::tempdir()?;

    {
        let client = connect_client(&fixture, dir.path()).await?;
        let mut messages = client.router.subscribe_messages();
        client.router.select_peer(42);
        assert!(client.router.send_text("prima"));
        recv_message(&mut messages).await?;
        client.conn.disconnect();
    }

    // A fresh client over the same state directory sees the thread and
    // the restored active peer.
    let client = connect_client(&fixture, dir.path()).await?;
    assert_eq!(client.router.store().active_peer(), Some(42));
    let thread = client.router.store().thread(42);
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].text, "prima");
    Ok(())
}
