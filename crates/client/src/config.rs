// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Configuration for the Serata client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the Serata backend.
    #[arg(long, default_value = "http://127.0.0.1:4600", env = "SERATA_SERVER_URL")]
    pub server_url: String,

    /// State directory for persisted client data.
    #[arg(long, env = "SERATA_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Max messages retained per conversation thread.
    #[arg(long, default_value_t = 200, env = "SERATA_THREAD_CAP")]
    pub thread_cap: usize,

    /// Realtime reconnect backoff in milliseconds.
    #[arg(long, default_value_t = 1500, env = "SERATA_RECONNECT_MS")]
    pub reconnect_ms: u64,

    /// HTTP request timeout in milliseconds.
    #[arg(long, default_value_t = 10000, env = "SERATA_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Persisted-storage quota in bytes. Unlimited if unset.
    #[arg(long, env = "SERATA_STORAGE_QUOTA")]
    pub storage_quota: Option<usize>,
}

impl ClientConfig {
    pub fn reconnect_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolved state directory (explicit override or platform default).
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::storage::state_dir)
    }

    /// WebSocket upgrade URL derived from the base URL.
    pub fn ws_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if base.starts_with("https://") {
            base.replacen("https://", "wss://", 1)
        } else {
            base.replacen("http://", "ws://", 1)
        };
        format!("{ws_base}/ws")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
