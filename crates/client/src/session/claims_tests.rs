// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::{decode_claims, strip_bearer, token_is_valid};

fn make_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[test]
fn strips_bearer_prefix() {
    assert_eq!(strip_bearer("Bearer abc.def.ghi"), "abc.def.ghi");
    assert_eq!(strip_bearer("abc.def.ghi"), "abc.def.ghi");
}

#[test]
fn decodes_id_username_role_exp() {
    let token = make_token(serde_json::json!({
        "id": 7, "username": "ada", "role": "admin", "exp": 1999
    }));
    let claims = decode_claims(&token).unwrap_or_default();
    assert_eq!(claims.user_id, Some(7));
    assert_eq!(claims.username.as_deref(), Some("ada"));
    assert_eq!(claims.role.as_deref(), Some("admin"));
    assert_eq!(claims.exp, Some(1999));
}

#[test]
fn falls_back_to_sub_for_identity() {
    let token = make_token(serde_json::json!({"sub": "42"}));
    let claims = decode_claims(&token).unwrap_or_default();
    assert_eq!(claims.user_id, Some(42));
}

#[test]
fn id_wins_over_sub() {
    let token = make_token(serde_json::json!({"id": 7, "sub": 42}));
    let claims = decode_claims(&token).unwrap_or_default();
    assert_eq!(claims.user_id, Some(7));
}

#[test]
fn garbage_token_yields_no_claims() {
    assert_eq!(decode_claims("not-a-jwt"), None);
    assert_eq!(decode_claims("also.not!base64.here"), None);
}

#[test]
fn expiry_gates_validity() {
    let expired = make_token(serde_json::json!({"id": 1, "exp": 100}));
    let fresh = make_token(serde_json::json!({"id": 1, "exp": 100}));
    assert!(!token_is_valid(&expired, 101));
    assert!(token_is_valid(&fresh, 99));
}

#[test]
fn token_without_expiry_is_valid() {
    let token = make_token(serde_json::json!({"id": 1}));
    assert!(token_is_valid(&token, u64::MAX));
}

#[test]
fn undecodable_token_counts_as_no_expiry() {
    assert!(token_is_valid("opaque-session-token", u64::MAX));
}
