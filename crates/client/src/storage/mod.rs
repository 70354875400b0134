// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-persisted key/value storage.
//!
//! The backend of every durable piece of client state: session tokens,
//! conversation threads, unread counters, the active peer. Keys are plain
//! strings; values are opaque strings (JSON-encoded by callers). A store
//! may enforce a byte quota, in which case writes that would exceed it
//! fail with [`StorageError::QuotaExceeded`] and leave the stored state
//! unchanged.

pub mod file;

use std::fmt;
use std::path::PathBuf;

pub use file::FileStore;

/// Key/value storage shared by all client components.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str);
}

/// Storage write failure.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// The write would exceed the configured byte quota. The store still
    /// holds the pre-write state.
    QuotaExceeded { needed: usize, quota: usize },
    /// Underlying I/O failure.
    Io(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExceeded { needed, quota } => {
                write!(f, "storage quota exceeded ({needed} > {quota} bytes)")
            }
            Self::Io(msg) => write!(f, "storage i/o error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Resolve the state directory for persisted client data.
///
/// Checks `SERATA_STATE_DIR`, then `$XDG_STATE_HOME/serata`,
/// then `$HOME/.local/state/serata`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SERATA_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("serata");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/serata");
    }
    PathBuf::from(".serata")
}
