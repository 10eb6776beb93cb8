//! Property-based invariant tests for the loadable state machine, the
//! observer hub, and group aggregation.
//!
//! These tests verify structural invariants that must hold for any sequence
//! of operations:
//!
//! 1. An error is stored only while the state is `FailedToSync`.
//! 2. Contents availability is monotone under sync traffic (only an explicit
//!    clear can reset it).
//! 3. A model oracle predicts the state and the exact notification count for
//!    arbitrary producer/caller operation sequences.
//! 4. `sync()` while `Syncing` never notifies.
//! 5. Observer hook counts equal the number of 0↔1 boundary crossings for
//!    arbitrary add/remove sequences.
//! 6. Group aggregation matches an independent oracle, including the
//!    identity of the representative error.
//! 7. No operation sequence panics.

use std::cell::Cell;
use std::rc::Rc;

use loadable_core::{
    BaseLoadable, Loadable, LoadableObserver, LoadableState, ObserverGuard, ObserverHub,
    PureLoadable, PureLoadableGroup, SyncError, SyncFailed,
};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Op {
    Sync,
    SyncIfNeeded,
    SetSyncing,
    SetSynced,
    SetFailed { with_error: bool },
    NotifyDidChange,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Sync),
        Just(Op::SyncIfNeeded),
        Just(Op::SetSyncing),
        Just(Op::SetSynced),
        proptest::bool::ANY.prop_map(|with_error| Op::SetFailed { with_error }),
        Just(Op::NotifyDidChange),
    ]
}

/// Oracle mirroring the documented transition rules, driven alongside the
/// real loadable.
#[derive(Debug)]
struct Model {
    state: LoadableState,
    contents: bool,
    has_error: bool,
    notifications: u32,
}

impl Model {
    fn new() -> Self {
        Self {
            state: LoadableState::Idle,
            contents: false,
            has_error: false,
            notifications: 0,
        }
    }

    fn enter_syncing(&mut self) {
        if self.state != LoadableState::Syncing {
            self.state = LoadableState::Syncing;
            self.has_error = false;
            self.notifications += 1;
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Sync | Op::SetSyncing => self.enter_syncing(),
            // The default needs-sync predicate is "contents not available".
            Op::SyncIfNeeded => {
                if !self.contents {
                    self.enter_syncing();
                }
            }
            Op::SetSynced => {
                self.contents = true;
                if self.state != LoadableState::SyncedSuccessfully {
                    self.state = LoadableState::SyncedSuccessfully;
                    self.has_error = false;
                    self.notifications += 1;
                }
            }
            Op::SetFailed { with_error } => {
                // Always notifies: the payload changed even if the state
                // did not.
                self.state = LoadableState::FailedToSync;
                self.has_error = with_error;
                self.notifications += 1;
            }
            Op::NotifyDidChange => self.notifications += 1,
        }
    }
}

fn apply(loadable: &BaseLoadable, op: Op) {
    match op {
        Op::Sync => loadable.sync(),
        Op::SyncIfNeeded => loadable.sync_if_needed(),
        Op::SetSyncing => loadable.set_syncing(),
        Op::SetSynced => loadable.set_did_sync_successfully(),
        Op::SetFailed { with_error } => {
            loadable.set_failed_to_sync(with_error.then(|| SyncFailed::shared("induced failure")));
        }
        Op::NotifyDidChange => loadable.notify_did_change(),
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-4. State machine vs. model oracle
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn state_machine_matches_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let loadable = Rc::new(BaseLoadable::new());
        let notifications = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&notifications);
        let _guard = ObserverGuard::observing(&loadable, move || seen.set(seen.get() + 1));

        let mut model = Model::new();
        let mut contents_was_available = false;
        for op in ops {
            apply(&loadable, op);
            model.apply(op);

            prop_assert_eq!(loadable.state(), model.state);
            prop_assert_eq!(loadable.is_contents_available(), model.contents);
            prop_assert_eq!(loadable.error().is_some(), model.has_error);
            prop_assert_eq!(notifications.get(), model.notifications);

            // 1. Error only in the failed state.
            if loadable.error().is_some() {
                prop_assert_eq!(loadable.state(), LoadableState::FailedToSync);
            }
            // 2. Contents never regress without an explicit clear.
            if contents_was_available {
                prop_assert!(loadable.is_contents_available());
            }
            contents_was_available = loadable.is_contents_available();
        }
    }
}

proptest! {
    #[test]
    fn redundant_sync_requests_stay_silent(extra in 1usize..8) {
        let loadable = Rc::new(BaseLoadable::new());
        let notifications = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&notifications);
        let _guard = ObserverGuard::observing(&loadable, move || seen.set(seen.get() + 1));

        loadable.sync();
        for _ in 0..extra {
            loadable.sync();
            loadable.set_syncing();
        }
        prop_assert_eq!(loadable.state(), LoadableState::Syncing);
        prop_assert_eq!(notifications.get(), 1);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Hook counts equal boundary crossings
// ═════════════════════════════════════════════════════════════════════════

struct NullObserver;

impl LoadableObserver for NullObserver {
    fn loadable_did_change(&self) {}
}

proptest! {
    #[test]
    fn hooks_count_boundary_crossings(
        steps in proptest::collection::vec((0usize..4, proptest::bool::ANY), 0..40),
    ) {
        let hub = ObserverHub::new();
        let firsts = Rc::new(Cell::new(0u32));
        let lasts = Rc::new(Cell::new(0u32));
        {
            let firsts = Rc::clone(&firsts);
            hub.set_on_first_observer(move || firsts.set(firsts.get() + 1));
        }
        {
            let lasts = Rc::clone(&lasts);
            hub.set_on_last_observer(move || lasts.set(lasts.get() + 1));
        }

        let pool: Vec<Rc<dyn LoadableObserver>> =
            (0..4).map(|_| Rc::new(NullObserver) as Rc<dyn LoadableObserver>).collect();

        let mut live = [false; 4];
        let mut expected_firsts = 0u32;
        let mut expected_lasts = 0u32;
        for (index, add) in steps {
            let count_before = live.iter().filter(|l| **l).count();
            if add {
                hub.add(&pool[index]);
                if !live[index] {
                    live[index] = true;
                    if count_before == 0 {
                        expected_firsts += 1;
                    }
                }
            } else {
                hub.remove(&pool[index]);
                if live[index] {
                    live[index] = false;
                    if count_before == 1 {
                        expected_lasts += 1;
                    }
                }
            }
            prop_assert_eq!(hub.has_observers(), live.iter().any(|l| *l));
        }
        prop_assert_eq!(firsts.get(), expected_firsts);
        prop_assert_eq!(lasts.get(), expected_lasts);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Group aggregation matches the oracle
// ═════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug)]
enum ChildSpec {
    Idle,
    Syncing,
    Synced,
    Failed { with_error: bool },
}

fn child_spec_strategy() -> impl Strategy<Value = ChildSpec> {
    prop_oneof![
        Just(ChildSpec::Idle),
        Just(ChildSpec::Syncing),
        Just(ChildSpec::Synced),
        proptest::bool::ANY.prop_map(|with_error| ChildSpec::Failed { with_error }),
    ]
}

fn oracle(specs: &[ChildSpec], errors: &[Option<SyncError>]) -> (LoadableState, Option<SyncError>) {
    if specs.is_empty() {
        return (LoadableState::SyncedSuccessfully, None);
    }
    if specs.iter().any(|s| matches!(s, ChildSpec::Syncing)) {
        return (LoadableState::Syncing, None);
    }
    if let Some(first_failing) = specs
        .iter()
        .position(|s| matches!(s, ChildSpec::Failed { .. }))
    {
        return (LoadableState::FailedToSync, errors[first_failing].clone());
    }
    if specs.iter().all(|s| matches!(s, ChildSpec::Synced)) {
        return (LoadableState::SyncedSuccessfully, None);
    }
    (LoadableState::Idle, None)
}

proptest! {
    #[test]
    fn group_state_matches_oracle(specs in proptest::collection::vec(child_spec_strategy(), 0..8)) {
        let mut children = Vec::new();
        let mut errors = Vec::new();
        for spec in &specs {
            let child = Rc::new(BaseLoadable::new());
            let mut error = None;
            match spec {
                ChildSpec::Idle => {}
                ChildSpec::Syncing => child.set_syncing(),
                ChildSpec::Synced => child.set_did_sync_successfully(),
                ChildSpec::Failed { with_error } => {
                    error = with_error.then(|| SyncFailed::shared("child failed"));
                    child.set_failed_to_sync(error.clone());
                }
            }
            children.push(child as Rc<dyn PureLoadable>);
            errors.push(error);
        }

        let group = PureLoadableGroup::new(children);
        let (expected_state, expected_error) = oracle(&specs, &errors);
        prop_assert_eq!(group.state(), expected_state);
        match (group.error(), expected_error) {
            (None, None) => {}
            (Some(actual), Some(expected)) => prop_assert!(Rc::ptr_eq(&actual, &expected)),
            (actual, expected) => {
                return Err(TestCaseError::fail(format!(
                    "error mismatch: got {actual:?}, expected {expected:?}"
                )));
            }
        }
        prop_assert_eq!(
            group.is_contents_available(),
            expected_state == LoadableState::SyncedSuccessfully
        );
    }
}
