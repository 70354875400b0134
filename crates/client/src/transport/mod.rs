// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transports: authorized HTTP client and realtime WebSocket connection.

pub mod event;
pub mod http;
pub mod ws;

pub use event::{ClientEvent, ServerEvent};
pub use http::ApiClient;
pub use ws::RealtimeConnection;

/// Build the shared reqwest client with a request timeout.
pub(crate) fn http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}
