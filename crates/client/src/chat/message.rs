// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat message type and boundary normalization.
//!
//! Inbound payloads are loosely typed: alternate field names, ids that
//! arrive as numbers or strings, missing timestamps. Everything is
//! normalized into [`ChatMessage`] immediately on receipt; the raw shape
//! never travels past this module.

use serde::{Deserialize, Serialize};

/// A direct message. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned when available, else a generated fallback (not
    /// guaranteed globally unique across clients).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub sender_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<u64>,
}

/// Normalize a raw inbound message payload.
///
/// Sender id comes from `fromUserId` else `userId` (first non-null
/// wins); recipient from `toUserId` else `to`. A missing id gets a
/// generated UUID; a missing time defaults to now. Returns `None` when
/// no non-zero sender id can be derived — such messages are malformed
/// and dropped.
pub fn normalize_message(raw: &serde_json::Value) -> Option<ChatMessage> {
    let sender_id = field_u64(raw, "fromUserId")
        .or_else(|| field_u64(raw, "userId"))
        .filter(|id| *id != 0)?;
    let recipient_id = field_u64(raw, "toUserId").or_else(|| field_u64(raw, "to"));

    let id = match raw.get("id") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    Some(ChatMessage {
        id,
        author: raw.get("author").and_then(|v| v.as_str()).map(String::from),
        text: raw.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_owned(),
        timestamp: raw.get("time").and_then(|v| v.as_u64()).unwrap_or_else(epoch_ms),
        sender_id,
        recipient_id,
    })
}

/// Read a numeric field that may arrive as a JSON number or a string.
fn field_u64(value: &serde_json::Value, key: &str) -> Option<u64> {
    let v = value.get(key)?;
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Current epoch millis.
pub(crate) fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
