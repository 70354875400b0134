// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime wire events.
//!
//! Outbound events serialize to `event`-tagged JSON. Inbound frames are
//! normalized from loose JSON here and nowhere else; subscribers only
//! ever see [`ServerEvent`].

use serde::Serialize;

use crate::chat::message::{normalize_message, ChatMessage};
use crate::presence::OnlineUser;

/// Outbound client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    /// Request a full presence snapshot.
    #[serde(rename = "presence:get")]
    PresenceGet,
    /// Announce the selected conversation peer.
    #[serde(rename = "chat:dm:open")]
    DmOpen {
        #[serde(rename = "peerId")]
        peer_id: u64,
    },
    /// Send a direct message to a peer.
    #[serde(rename = "chat:send")]
    ChatSend { to: u64, text: String },
}

/// Inbound server events, after boundary normalization.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Full online roster; replaces all prior presence state.
    PresenceSnapshot(Vec<OnlineUser>),
    /// Single-peer online/update.
    PresenceUpsert(OnlineUser),
    /// Single-peer offline.
    PresenceRemove { id: u64 },
    /// Bulk history for one conversation.
    DmHistory { peer_id: u64, messages: Vec<ChatMessage> },
    /// One live direct message.
    Message(ChatMessage),
}

/// Parse one inbound frame. Returns `None` for unknown events and for
/// payloads that fail normalization (both are dropped with a log line by
/// the connection layer).
pub fn parse_server_event(raw: &serde_json::Value) -> Option<ServerEvent> {
    let event = raw.get("event").and_then(|v| v.as_str()).unwrap_or_default();
    match event {
        "users:list" | "presence:list" => {
            let users = raw
                .get("users")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(parse_online_user).collect())
                .unwrap_or_default();
            Some(ServerEvent::PresenceSnapshot(users))
        }
        "users:online" | "presence:update" => {
            let payload = raw.get("user").unwrap_or(raw);
            parse_online_user(payload).map(ServerEvent::PresenceUpsert)
        }
        "users:offline" | "presence:remove" => {
            field_u64(raw, "id").map(|id| ServerEvent::PresenceRemove { id })
        }
        "chat:dm:history" => {
            let peer_id = field_u64(raw, "peerId")?;
            let messages = raw
                .get("messages")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(normalize_message).collect())
                .unwrap_or_default();
            Some(ServerEvent::DmHistory { peer_id, messages })
        }
        "chat:message" => normalize_message(raw).map(ServerEvent::Message),
        // DMs are double-published; `chat:message` is the canonical
        // channel, so the DM-specific duplicate is never delivered.
        "chat:dm:message" => None,
        _ => None,
    }
}

fn parse_online_user(raw: &serde_json::Value) -> Option<OnlineUser> {
    let id = field_u64(raw, "id").filter(|id| *id != 0)?;
    let username =
        raw.get("username").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
    Some(OnlineUser { id, username })
}

fn field_u64(value: &serde_json::Value, key: &str) -> Option<u64> {
    let v = value.get(key)?;
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
