// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-peer conversation threads, unread counters, and the active peer,
//! persisted write-through to client storage.
//!
//! Storage keys are namespaced by the local user id so switching
//! accounts never leaks another account's conversations. A quota-failed
//! thread write triggers compaction: evict the least-recently-active
//! threads first, then truncate the thread being written, then give up
//! and keep the data in memory only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chat::message::ChatMessage;
use crate::storage::{Storage, StorageError};

/// Fraction of threads evicted per compaction round, bounded below and
/// above (oldest 20%, minimum one, maximum two).
const EVICT_MIN: usize = 1;
const EVICT_MAX: usize = 2;

#[derive(Default)]
struct Inner {
    threads: HashMap<u64, Vec<ChatMessage>>,
    unread: HashMap<u64, u32>,
    active: Option<u64>,
    focused: bool,
}

/// Durable conversation state for one logged-in user.
pub struct ThreadStore {
    storage: Arc<dyn Storage>,
    user_id: u64,
    cap: usize,
    inner: Mutex<Inner>,
}

impl ThreadStore {
    /// Hydrate from storage. Undecodable persisted state is discarded.
    pub fn load(storage: Arc<dyn Storage>, user_id: u64, cap: usize) -> Self {
        let threads = storage
            .get(&threads_key(user_id))
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        let unread = storage
            .get(&unread_key(user_id))
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        let active = storage.get(&active_key(user_id)).and_then(|s| s.parse().ok());
        let inner = Inner { threads, unread, active, focused: true };
        Self { storage, user_id, cap, inner: Mutex::new(inner) }
    }

    // -- Mutations -------------------------------------------------------------

    /// Append one live message to a peer's thread, bounded to the cap
    /// (oldest dropped first). Bumps the unread counter unless the
    /// thread is active and the window focused.
    pub fn record(&self, peer_id: u64, msg: ChatMessage) {
        let mut inner = self.inner.lock();
        let own = msg.sender_id == self.user_id;
        {
            let thread = inner.threads.entry(peer_id).or_default();
            thread.push(msg);
        }
        Self::trim(&mut inner.threads, peer_id, self.cap);
        if !own && !(inner.active == Some(peer_id) && inner.focused) {
            *inner.unread.entry(peer_id).or_insert(0) += 1;
            self.persist_unread(&inner);
        }
        self.persist_threads(&mut inner, peer_id);
    }

    /// Merge a bulk history load into a peer's thread. Messages whose id
    /// is already present are skipped; the newly added ones are returned
    /// in arrival order. Unread counters are untouched — history is
    /// reconciliation, not arrival.
    pub fn record_history(
        &self,
        peer_id: u64,
        messages: Vec<ChatMessage>,
    ) -> Vec<ChatMessage> {
        let mut inner = self.inner.lock();
        let fresh: Vec<ChatMessage> = {
            let thread = inner.threads.entry(peer_id).or_default();
            let fresh: Vec<ChatMessage> = messages
                .into_iter()
                .filter(|m| !thread.iter().any(|seen| seen.id == m.id))
                .collect();
            thread.extend(fresh.iter().cloned());
            fresh
        };
        if fresh.is_empty() {
            return fresh;
        }
        Self::trim(&mut inner.threads, peer_id, self.cap);
        self.persist_threads(&mut inner, peer_id);
        fresh
    }

    /// Select (or clear) the active peer. Activating a thread while
    /// focused clears its unread count.
    pub fn set_active(&self, peer_id: Option<u64>) {
        let mut inner = self.inner.lock();
        inner.active = peer_id;
        if let Some(peer_id) = peer_id {
            if inner.focused {
                inner.unread.remove(&peer_id);
                self.persist_unread(&inner);
            }
        }
        match peer_id {
            Some(peer_id) => {
                if let Err(e) = self.storage.set(&active_key(self.user_id), &peer_id.to_string())
                {
                    tracing::warn!(err = %e, "failed to persist active peer");
                }
            }
            None => self.storage.remove(&active_key(self.user_id)),
        }
    }

    /// Window focus gate for unread accounting. Focusing with an active
    /// thread clears that thread's unread count.
    pub fn set_focused(&self, focused: bool) {
        let mut inner = self.inner.lock();
        inner.focused = focused;
        if focused {
            if let Some(peer_id) = inner.active {
                inner.unread.remove(&peer_id);
                self.persist_unread(&inner);
            }
        }
    }

    // -- Reads -----------------------------------------------------------------

    pub fn active_peer(&self) -> Option<u64> {
        self.inner.lock().active
    }

    pub fn thread(&self, peer_id: u64) -> Vec<ChatMessage> {
        self.inner.lock().threads.get(&peer_id).cloned().unwrap_or_default()
    }

    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads.len()
    }

    pub fn unread(&self, peer_id: u64) -> u32 {
        self.inner.lock().unread.get(&peer_id).copied().unwrap_or(0)
    }

    pub fn unread_counts(&self) -> HashMap<u64, u32> {
        self.inner.lock().unread.clone()
    }

    // -- Persistence -----------------------------------------------------------

    fn trim(threads: &mut HashMap<u64, Vec<ChatMessage>>, peer_id: u64, cap: usize) {
        if let Some(thread) = threads.get_mut(&peer_id) {
            if thread.len() > cap {
                let excess = thread.len() - cap;
                thread.drain(..excess);
            }
        }
    }

    /// Write-through of the full thread map, with quota compaction.
    /// `current` is the thread that triggered the write; it is never
    /// evicted outright, only truncated as the last resort.
    fn persist_threads(&self, inner: &mut Inner, current: u64) {
        match self.write_threads(&inner.threads) {
            Ok(()) => return,
            Err(StorageError::QuotaExceeded { .. }) => {}
            Err(e) => {
                tracing::warn!(err = %e, "thread persistence failed");
                return;
            }
        }

        // Evict the least-recently-active threads entirely.
        let stale = stale_threads(&inner.threads, current);
        for peer_id in &stale {
            inner.threads.remove(peer_id);
        }
        tracing::debug!(evicted = stale.len(), "compacted thread storage");
        match self.write_threads(&inner.threads) {
            Ok(()) => return,
            Err(StorageError::QuotaExceeded { .. }) => {}
            Err(e) => {
                tracing::warn!(err = %e, "thread persistence failed");
                return;
            }
        }

        // Still over quota: keep only the most recent half of the thread
        // being written (never less than the newest message), then try
        // once more.
        if let Some(thread) = inner.threads.get_mut(&current) {
            let keep = (thread.len() / 2).max(1);
            let drop = thread.len() - keep;
            thread.drain(..drop);
        }
        if let Err(e) = self.write_threads(&inner.threads) {
            // Not durable; the messages stay in memory for the session.
            tracing::warn!(err = %e, "thread persistence dropped");
        }
    }

    fn write_threads(
        &self,
        threads: &HashMap<u64, Vec<ChatMessage>>,
    ) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(threads).map_err(|e| StorageError::Io(e.to_string()))?;
        self.storage.set(&threads_key(self.user_id), &json)
    }

    fn persist_unread(&self, inner: &Inner) {
        match serde_json::to_string(&inner.unread) {
            Ok(json) => {
                if let Err(e) = self.storage.set(&unread_key(self.user_id), &json) {
                    tracing::warn!(err = %e, "failed to persist unread counts");
                }
            }
            Err(e) => tracing::warn!(err = %e, "failed to encode unread counts"),
        }
    }
}

/// Pick eviction victims: threads ordered by the timestamp of their last
/// message (empty threads first), excluding `current`, limited to the
/// oldest 20% (minimum one, maximum two).
fn stale_threads(threads: &HashMap<u64, Vec<ChatMessage>>, current: u64) -> Vec<u64> {
    let mut candidates: Vec<(u64, u64)> = threads
        .iter()
        .filter(|(id, _)| **id != current)
        .map(|(id, msgs)| (*id, msgs.last().map(|m| m.timestamp).unwrap_or(0)))
        .collect();
    candidates.sort_by_key(|(_, last)| *last);
    let count = (threads.len() / 5).clamp(EVICT_MIN, EVICT_MAX);
    candidates.into_iter().take(count).map(|(id, _)| id).collect()
}

fn threads_key(user_id: u64) -> String {
    format!("chat:{user_id}:threads")
}

fn unread_key(user_id: u64) -> String {
    format!("chat:{user_id}:unread")
}

fn active_key(user_id: u64) -> String {
    format!("chat:{user_id}:active")
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
