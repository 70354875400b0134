// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors surfaced by the API client and the auth session.
///
/// Authorization failures are handled centrally by the request layer
/// (refresh-and-retry); callers only ever see the terminal outcome.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Login rejected by the backend.
    InvalidCredentials,
    /// Request rejected with an authorization-failure status and the
    /// coalesced refresh could not recover it.
    AuthorizationExpired,
    /// The refresh endpoint rejected or errored.
    RefreshFailed(String),
    /// Network-level failure (connect, timeout, body decode).
    Transport(String),
    /// Any other non-success HTTP status, propagated unchanged.
    Status { code: u16, body: String },
}

impl ApiError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AuthorizationExpired => "AUTHORIZATION_EXPIRED",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::Transport(_) => "TRANSPORT",
            Self::Status { .. } => "STATUS",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => f.write_str("invalid credentials"),
            Self::AuthorizationExpired => f.write_str("authorization expired"),
            Self::RefreshFailed(msg) => write!(f, "token refresh failed: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Status { code, body } => write!(f, "request failed ({code}): {body}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
