// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::DmRouter;
use crate::chat::store::ThreadStore;
use crate::storage::Storage;
use crate::test_support::MemStore;
use crate::transport::ws::RealtimeConnection;

/// A connection to nowhere: never live, reconnects far in the future.
fn dead_connection() -> Arc<RealtimeConnection> {
    Arc::new(RealtimeConnection::connect(
        "ws://127.0.0.1:9/ws",
        "opaque-token",
        Duration::from_secs(3600),
    ))
}

fn router() -> Arc<DmRouter> {
    let storage = Arc::new(MemStore::new()) as Arc<dyn Storage>;
    let store = Arc::new(ThreadStore::load(storage, 7, 50));
    DmRouter::new(dead_connection(), store)
}

#[tokio::test]
async fn select_peer_persists_and_emits_selection() {
    let router = router();
    let mut selection = router.subscribe_selection();

    router.select_peer(42);
    assert_eq!(router.store().active_peer(), Some(42));
    assert_eq!(selection.try_recv().ok(), Some(42));
}

#[tokio::test]
async fn send_text_rejects_whitespace_only() {
    let router = router();
    router.select_peer(42);
    assert!(!router.send_text(""));
    assert!(!router.send_text("   \t\n"));
}

#[tokio::test]
async fn send_text_requires_selected_peer() {
    let router = router();
    assert!(!router.send_text("hello"));
}

#[tokio::test]
async fn send_text_requires_live_connection() {
    let router = router();
    router.select_peer(42);
    assert!(!router.send_text("hello"));
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let conn = dead_connection();
    conn.disconnect();
    conn.disconnect();
    assert!(!conn.is_live());
}
