// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{parse_server_event, ClientEvent, ServerEvent};

// -- Outbound wire format -----------------------------------------------------

#[test]
fn presence_get_serializes_bare() -> anyhow::Result<()> {
    let value = serde_json::to_value(ClientEvent::PresenceGet)?;
    assert_eq!(value, json!({"event": "presence:get"}));
    Ok(())
}

#[test]
fn dm_open_carries_camel_case_peer_id() -> anyhow::Result<()> {
    let value = serde_json::to_value(ClientEvent::DmOpen { peer_id: 42 })?;
    assert_eq!(value, json!({"event": "chat:dm:open", "peerId": 42}));
    Ok(())
}

#[test]
fn chat_send_carries_to_and_text() -> anyhow::Result<()> {
    let value =
        serde_json::to_value(ClientEvent::ChatSend { to: 42, text: "hello".to_owned() })?;
    assert_eq!(value, json!({"event": "chat:send", "to": 42, "text": "hello"}));
    Ok(())
}

// -- Inbound normalization ----------------------------------------------------

#[test]
fn snapshot_parses_under_both_names() {
    for name in ["users:list", "presence:list"] {
        let raw = json!({"event": name, "users": [{"id": 1, "username": "a"}]});
        match parse_server_event(&raw) {
            Some(ServerEvent::PresenceSnapshot(users)) => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].id, 1);
            }
            other => unreachable!("{name}: unexpected {other:?}"),
        }
    }
}

#[test]
fn upsert_parses_under_both_names_and_shapes() {
    // Nested `user` object and flat fields are both accepted.
    let nested = json!({"event": "users:online", "user": {"id": 2, "username": "b"}});
    let flat = json!({"event": "presence:update", "id": 2, "username": "b"});
    for raw in [nested, flat] {
        match parse_server_event(&raw) {
            Some(ServerEvent::PresenceUpsert(user)) => assert_eq!(user.id, 2),
            other => unreachable!("unexpected {other:?}"),
        }
    }
}

#[test]
fn remove_parses_under_both_names() {
    for name in ["users:offline", "presence:remove"] {
        let raw = json!({"event": name, "id": 3});
        match parse_server_event(&raw) {
            Some(ServerEvent::PresenceRemove { id }) => assert_eq!(id, 3),
            other => unreachable!("{name}: unexpected {other:?}"),
        }
    }
}

#[test]
fn history_parses_and_drops_malformed_entries() {
    let raw = json!({
        "event": "chat:dm:history",
        "peerId": 42,
        "messages": [
            {"id": "m1", "fromUserId": 42, "text": "ciao"},
            {"id": "bad", "text": "no sender"},
        ],
    });
    match parse_server_event(&raw) {
        Some(ServerEvent::DmHistory { peer_id, messages }) => {
            assert_eq!(peer_id, 42);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].id, "m1");
        }
        other => unreachable!("unexpected {other:?}"),
    }
}

#[test]
fn chat_message_is_canonical() {
    let raw = json!({"event": "chat:message", "id": "m1", "fromUserId": 7, "text": "hi"});
    assert!(matches!(parse_server_event(&raw), Some(ServerEvent::Message(_))));
}

#[test]
fn dm_specific_duplicate_channel_is_never_delivered() {
    let raw =
        json!({"event": "chat:dm:message", "id": "m1", "fromUserId": 7, "text": "hi"});
    assert!(parse_server_event(&raw).is_none());
}

#[test]
fn unknown_events_are_dropped() {
    assert!(parse_server_event(&json!({"event": "karaoke:start"})).is_none());
    assert!(parse_server_event(&json!({"no_event": true})).is_none());
}

#[test]
fn malformed_live_message_is_dropped() {
    let raw = json!({"event": "chat:message", "id": "m1", "text": "no sender"});
    assert!(parse_server_event(&raw).is_none());
}
