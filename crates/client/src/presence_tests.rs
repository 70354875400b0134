// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::{OnlineUser, PresenceTracker};
use crate::transport::event::ServerEvent;

fn user(id: u64, name: &str) -> OnlineUser {
    OnlineUser { id, username: name.to_owned() }
}

fn sorted_ids(tracker: &PresenceTracker) -> Vec<u64> {
    let mut ids: Vec<u64> = tracker.online().into_iter().map(|u| u.id).collect();
    ids.sort_unstable();
    ids
}

#[test]
fn snapshot_replaces_entirely() {
    let tracker = PresenceTracker::new(None);
    tracker.apply(&ServerEvent::PresenceSnapshot(vec![user(1, "a"), user(2, "b")]));
    assert_eq!(sorted_ids(&tracker), vec![1, 2]);

    tracker.apply(&ServerEvent::PresenceSnapshot(vec![user(3, "c")]));
    assert_eq!(sorted_ids(&tracker), vec![3]);
}

#[test]
fn snapshot_filters_local_user() {
    let tracker = PresenceTracker::new(Some(2));
    tracker.apply(&ServerEvent::PresenceSnapshot(vec![user(1, "a"), user(2, "me")]));
    assert_eq!(sorted_ids(&tracker), vec![1]);
}

#[test]
fn upsert_adds_updates_and_skips_local() {
    let tracker = PresenceTracker::new(Some(9));
    tracker.apply(&ServerEvent::PresenceUpsert(user(1, "a")));
    tracker.apply(&ServerEvent::PresenceUpsert(user(1, "renamed")));
    tracker.apply(&ServerEvent::PresenceUpsert(user(9, "me")));

    let online = tracker.online();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].username, "renamed");
}

#[test]
fn remove_only_touches_target() {
    let tracker = PresenceTracker::new(None);
    tracker.apply(&ServerEvent::PresenceSnapshot(vec![user(1, "a"), user(2, "b")]));
    tracker.apply(&ServerEvent::PresenceRemove { id: 1 });
    assert_eq!(sorted_ids(&tracker), vec![2]);

    // Removing an unknown peer is a no-op.
    tracker.apply(&ServerEvent::PresenceRemove { id: 77 });
    assert_eq!(sorted_ids(&tracker), vec![2]);
}

#[test]
fn delta_before_snapshot_converges() {
    let tracker = PresenceTracker::new(None);
    tracker.apply(&ServerEvent::PresenceUpsert(user(5, "early")));
    tracker.apply(&ServerEvent::PresenceSnapshot(vec![user(1, "a")]));
    // The snapshot is newer state; it wins wholesale.
    assert_eq!(sorted_ids(&tracker), vec![1]);
}

#[test]
fn roster_is_observable() {
    let tracker = PresenceTracker::new(None);
    let rx = tracker.subscribe();
    tracker.apply(&ServerEvent::PresenceUpsert(user(1, "a")));
    assert_eq!(rx.borrow().len(), 1);
}

// -- Convergence property -----------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Snapshot(Vec<u64>),
    Online(u64),
    Offline(u64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        prop::collection::vec(1u64..8, 0..5).prop_map(Step::Snapshot),
        (1u64..8).prop_map(Step::Online),
        (1u64..8).prop_map(Step::Offline),
    ]
}

/// Replay the sequence against a trivial model: final membership depends
/// only on the last event that touched each peer id.
fn model_apply(steps: &[Step]) -> Vec<u64> {
    let mut set = std::collections::BTreeSet::new();
    for step in steps {
        match step {
            Step::Snapshot(ids) => {
                set.clear();
                set.extend(ids.iter().copied());
            }
            Step::Online(id) => {
                set.insert(*id);
            }
            Step::Offline(id) => {
                set.remove(id);
            }
        }
    }
    set.into_iter().collect()
}

proptest! {
    #[test]
    fn tracker_matches_last_applied_wins_model(
        steps in prop::collection::vec(step_strategy(), 0..32)
    ) {
        let tracker = PresenceTracker::new(None);
        for step in &steps {
            match step {
                Step::Snapshot(ids) => tracker.apply(&ServerEvent::PresenceSnapshot(
                    ids.iter().map(|id| user(*id, "u")).collect(),
                )),
                Step::Online(id) => {
                    tracker.apply(&ServerEvent::PresenceUpsert(user(*id, "u")))
                }
                Step::Offline(id) => tracker.apply(&ServerEvent::PresenceRemove { id: *id }),
            }
        }
        prop_assert_eq!(sorted_ids(&tracker), model_apply(&steps));
    }
}
