// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct-message router.
//!
//! Maps inbound and outbound chat traffic onto conversations keyed by
//! peer identity. Inbound messages — live or bulk history — are
//! recorded in the thread store and re-emitted on one unified stream.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::chat::message::ChatMessage;
use crate::chat::store::ThreadStore;
use crate::transport::event::{ClientEvent, ServerEvent};
use crate::transport::ws::RealtimeConnection;

pub struct DmRouter {
    conn: Arc<RealtimeConnection>,
    store: Arc<ThreadStore>,
    message_tx: broadcast::Sender<ChatMessage>,
    selection_tx: broadcast::Sender<u64>,
}

impl DmRouter {
    /// Wire the router to a connection and start pumping inbound events.
    pub fn new(conn: Arc<RealtimeConnection>, store: Arc<ThreadStore>) -> Arc<Self> {
        let (message_tx, _) = broadcast::channel(256);
        let (selection_tx, _) = broadcast::channel(16);
        let router =
            Arc::new(Self { conn: Arc::clone(&conn), store, message_tx, selection_tx });

        let pump = Arc::clone(&router);
        let mut rx = conn.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ServerEvent::Message(msg)) => pump.deliver(msg),
                    Ok(ServerEvent::DmHistory { peer_id, messages }) => {
                        for msg in pump.store.record_history(peer_id, messages) {
                            let _ = pump.message_tx.send(msg);
                        }
                    }
                    Ok(_) => {} // presence events are not ours
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(lagged = n, "message feed lagged, skipping");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        router
    }

    /// Select the active conversation peer: persists the choice, emits
    /// it on the selection channel, and announces the peer to the server
    /// so it opens the conversation room and replays history.
    pub fn select_peer(&self, peer_id: u64) {
        self.store.set_active(Some(peer_id));
        let _ = self.selection_tx.send(peer_id);
        self.conn.send(ClientEvent::DmOpen { peer_id });
    }

    /// Send text to the active peer. No-op (returns false) when the
    /// trimmed text is empty, no peer is selected, or the connection is
    /// not live.
    pub fn send_text(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(to) = self.store.active_peer() else {
            return false;
        };
        if !self.conn.is_live() {
            return false;
        }
        self.conn.send(ClientEvent::ChatSend { to, text: text.to_owned() })
    }

    /// Unified inbound message stream (history and live alike).
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.message_tx.subscribe()
    }

    /// Active-peer selection events.
    pub fn subscribe_selection(&self) -> broadcast::Receiver<u64> {
        self.selection_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    /// Record one live message under the right conversation. An echo of
    /// our own message files under its recipient; anything else files
    /// under its sender.
    fn deliver(&self, msg: ChatMessage) {
        let local_id = self.conn.local_id();
        let peer_id = if local_id.is_some() && local_id == Some(msg.sender_id) {
            match msg.recipient_id {
                Some(recipient) => recipient,
                None => {
                    tracing::debug!(id = %msg.id, "own echo without recipient dropped");
                    return;
                }
            }
        } else {
            msg.sender_id
        };
        self.store.record(peer_id, msg.clone());
        let _ = self.message_tx.send(msg);
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
