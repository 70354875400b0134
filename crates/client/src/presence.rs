// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Online-peer tracking from snapshot and delta events.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::transport::event::ServerEvent;

/// A peer currently connected to the realtime channel. Ephemeral —
/// rebuilt entirely from server snapshots; no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub id: u64,
    pub username: String,
}

/// Observable set of online peers.
///
/// Snapshot and delta events may interleave in any order; state is
/// last-applied-wins per peer id, so the set converges regardless.
pub struct PresenceTracker {
    local_id: Option<u64>,
    users: RwLock<HashMap<u64, OnlineUser>>,
    roster: watch::Sender<Vec<OnlineUser>>,
}

impl PresenceTracker {
    /// `local_id` is the advisory own identity; when known, the local
    /// user is filtered out of the roster.
    pub fn new(local_id: Option<u64>) -> Self {
        let (roster, _) = watch::channel(Vec::new());
        Self { local_id, users: RwLock::new(HashMap::new()), roster }
    }

    /// Apply one inbound event. Non-presence events are ignored.
    pub fn apply(&self, event: &ServerEvent) {
        match event {
            ServerEvent::PresenceSnapshot(list) => {
                let mut users = self.users.write();
                users.clear();
                for user in list {
                    if Some(user.id) != self.local_id {
                        users.insert(user.id, user.clone());
                    }
                }
                self.publish(&users);
            }
            ServerEvent::PresenceUpsert(user) => {
                if Some(user.id) == self.local_id {
                    return;
                }
                let mut users = self.users.write();
                users.insert(user.id, user.clone());
                self.publish(&users);
            }
            ServerEvent::PresenceRemove { id } => {
                let mut users = self.users.write();
                if users.remove(id).is_some() {
                    self.publish(&users);
                }
            }
            _ => {}
        }
    }

    /// Current roster (arbitrary order).
    pub fn online(&self) -> Vec<OnlineUser> {
        self.users.read().values().cloned().collect()
    }

    pub fn is_online(&self, id: u64) -> bool {
        self.users.read().contains_key(&id)
    }

    /// Observe roster changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<OnlineUser>> {
        self.roster.subscribe()
    }

    /// Pump events from a realtime subscription into this tracker.
    pub fn attach(self: &Arc<Self>, mut rx: broadcast::Receiver<ServerEvent>) {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => tracker.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(lagged = n, "presence feed lagged, skipping");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn publish(&self, users: &HashMap<u64, OnlineUser>) {
        self.roster.send_replace(users.values().cloned().collect());
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
