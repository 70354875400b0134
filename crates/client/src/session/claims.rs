// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort bearer token inspection.
//!
//! Decodes the payload segment without verifying the signature. The
//! result is advisory — it personalizes the client (own id for presence
//! self-filtering and echo routing, expiry for the startup login check)
//! and is never an authorization decision; those stay server-enforced.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Claims read from a bearer token's payload segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub role: Option<String>,
    /// Expiry as epoch seconds, when the token carries one.
    pub exp: Option<u64>,
}

/// Strip an optional `Bearer ` scheme prefix.
pub fn strip_bearer(token: &str) -> &str {
    token.strip_prefix("Bearer ").unwrap_or(token)
}

/// Decode the payload segment of a token. Returns `None` when the token
/// is not three dot-separated segments of url-safe base64 JSON.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = strip_bearer(token).split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

    // The backend has emitted the numeric identity under both `id` and
    // `sub` across versions; first non-null wins.
    let user_id = field_u64(&value, "id").or_else(|| field_u64(&value, "sub"));
    Some(TokenClaims {
        user_id,
        username: value.get("username").and_then(|v| v.as_str()).map(String::from),
        role: value.get("role").and_then(|v| v.as_str()).map(String::from),
        exp: value.get("exp").and_then(|v| v.as_u64()),
    })
}

/// Whether a stored token still counts as a live login.
///
/// A token without an expiry claim (or one that does not decode at all)
/// is treated as valid; the server remains the authority either way.
pub fn token_is_valid(token: &str, now_epoch_secs: u64) -> bool {
    match decode_claims(token).and_then(|c| c.exp) {
        Some(exp) => exp > now_epoch_secs,
        None => true,
    }
}

/// Read a numeric field that may arrive as a JSON number or a string.
fn field_u64(value: &serde_json::Value, key: &str) -> Option<u64> {
    let v = value.get(key)?;
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
