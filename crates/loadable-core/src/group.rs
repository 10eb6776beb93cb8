#![forbid(unsafe_code)]

//! Loadable groups: many child loadables aggregated into one combined state.
//!
//! A [`Group`] owns an ordered, wholly-replaceable sequence of child
//! loadables, subscribes to each as an observer, and republishes a derived
//! state. A group is itself a loadable, so groups nest inside other groups
//! and proxies.
//!
//! Two public aliases cover the two capability levels:
//!
//! - [`PureLoadableGroup`] aggregates read-only loadables.
//! - [`LoadableGroup`] aggregates syncable loadables and forwards
//!   `sync()` / `sync_if_needed()` to every child.
//!
//! # Aggregation rule
//!
//! Evaluated over the current child sequence; an empty sequence is vacuously
//! synced:
//!
//! 1. Any child `Syncing` → `Syncing`.
//! 2. Else any child `FailedToSync` → `FailedToSync`, carrying the first
//!    failing child's error (cloned by reference).
//! 3. Else all children `SyncedSuccessfully` → `SyncedSuccessfully`.
//! 4. Else → `Idle`.
//!
//! Contents are available iff the aggregate is `SyncedSuccessfully`.
//!
//! # Invariants
//!
//! 1. The published state is a pure function of the children's states at the
//!    moment of recomputation.
//! 2. Recomputation runs synchronously on every child notification and on
//!    every child-sequence replacement.
//! 3. Observers (and the `group_did_change` hook) hear about a recompute
//!    only when the aggregate state or the representative error identity
//!    actually changed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::concurrency::{ConcurrencyGuard, ConcurrencyPolicy};
use crate::loadable::{Loadable, PureLoadable};
use crate::observer::{LoadableObserver, ObserverHub};
use crate::state::{LoadableState, SyncError};

/// A group of read-only loadables.
pub type PureLoadableGroup = Group<dyn PureLoadable>;

/// A group of syncable loadables; sync requests fan out to every child.
pub type LoadableGroup = Group<dyn Loadable>;

/// Composite loadable whose state is derived from an ordered set of
/// children. See the [module docs](self) for the aggregation rule.
pub struct Group<L: PureLoadable + ?Sized + 'static> {
    me: Weak<Group<L>>,
    guard: ConcurrencyGuard,
    children: RefCell<Vec<Rc<L>>>,
    state: Cell<LoadableState>,
    error: RefCell<Option<SyncError>>,
    hub: ObserverHub,
    on_change: RefCell<Option<Rc<dyn Fn()>>>,
}

impl<L: PureLoadable + ?Sized + 'static> std::fmt::Debug for Group<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("children", &self.children.borrow().len())
            .field("state", &self.state.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl<L: PureLoadable + ?Sized + 'static> Group<L> {
    /// Create a group observing the given children, with the default
    /// concurrency policy.
    #[must_use]
    pub fn new(children: Vec<Rc<L>>) -> Rc<Self> {
        Self::with_concurrency(children, ConcurrencyPolicy::default())
    }

    /// Create a group with an explicit concurrency policy.
    ///
    /// The child sequence can be replaced later (any number of times) via
    /// [`set_loadables`](Self::set_loadables), so passing an empty vector
    /// here and filling in the children after the fact is fine.
    #[must_use]
    pub fn with_concurrency(children: Vec<Rc<L>>, policy: ConcurrencyPolicy) -> Rc<Self> {
        let group = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            guard: ConcurrencyGuard::new(policy),
            children: RefCell::new(Vec::new()),
            // Empty aggregate: vacuously synced.
            state: Cell::new(LoadableState::SyncedSuccessfully),
            error: RefCell::new(None),
            hub: ObserverHub::new(),
            on_change: RefCell::new(None),
        });
        if !children.is_empty() {
            group.set_loadables(children);
        }
        group
    }
}

// ---------------------------------------------------------------------------
// Child management
// ---------------------------------------------------------------------------

impl<L: PureLoadable + ?Sized + 'static> Group<L> {
    /// Current child sequence.
    #[must_use]
    pub fn loadables(&self) -> Vec<Rc<L>> {
        self.guard.check("loadables");
        self.children.borrow().clone()
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.check("len");
        self.children.borrow().len()
    }

    /// Whether the group has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard.check("is_empty");
        self.children.borrow().is_empty()
    }

    /// Replace the whole child sequence: unsubscribe from the old children,
    /// store the new ones, subscribe to each, recompute, and notify if the
    /// aggregate changed. Atomic from the observers' perspective.
    pub fn set_loadables(&self, children: Vec<Rc<L>>) {
        self.guard.check("set_loadables");
        let me = self.as_observer();
        let old = self.children.replace(children);
        for child in &old {
            child.remove_observer(&me);
        }
        let current = self.children.borrow().clone();
        for child in &current {
            child.add_observer(&me);
        }
        self.recompute();
    }

    /// Install the hook fired when the aggregate changes, just before the
    /// group's own observers are notified.
    pub fn on_group_did_change(&self, hook: impl Fn() + 'static) {
        self.guard.check("on_group_did_change");
        *self.on_change.borrow_mut() = Some(Rc::new(hook));
    }

    fn as_observer(&self) -> Rc<dyn LoadableObserver> {
        self.me
            .upgrade()
            .expect("a group is always owned by the Rc created in with_concurrency")
    }

    fn recompute(&self) {
        let (state, error) = {
            let children = self.children.borrow();
            aggregate(&children)
        };
        let state_changed = self.state.get() != state;
        let error_changed = !same_error(&self.error.borrow(), &error);
        if !state_changed && !error_changed {
            return;
        }
        self.state.set(state);
        *self.error.borrow_mut() = error;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            message = "group.recompute",
            state = ?state,
            children = self.children.borrow().len(),
        );
        let hook = self.on_change.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.hub.notify();
    }
}

fn aggregate<L: PureLoadable + ?Sized>(children: &[Rc<L>]) -> (LoadableState, Option<SyncError>) {
    if children.is_empty() {
        return (LoadableState::SyncedSuccessfully, None);
    }
    let mut any_syncing = false;
    let mut any_failed = false;
    let mut all_synced = true;
    let mut representative: Option<SyncError> = None;
    for child in children {
        let state = child.state();
        match state {
            LoadableState::Syncing => any_syncing = true,
            LoadableState::FailedToSync => {
                if !any_failed {
                    representative = child.error();
                }
                any_failed = true;
            }
            LoadableState::SyncedSuccessfully | LoadableState::Idle => {}
        }
        if state != LoadableState::SyncedSuccessfully {
            all_synced = false;
        }
    }
    if any_syncing {
        (LoadableState::Syncing, None)
    } else if any_failed {
        (LoadableState::FailedToSync, representative)
    } else if all_synced {
        (LoadableState::SyncedSuccessfully, None)
    } else {
        (LoadableState::Idle, None)
    }
}

fn same_error(a: &Option<SyncError>, b: &Option<SyncError>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl<L: PureLoadable + ?Sized + 'static> LoadableObserver for Group<L> {
    fn loadable_did_change(&self) {
        self.recompute();
    }
}

impl<L: PureLoadable + ?Sized + 'static> PureLoadable for Group<L> {
    fn state(&self) -> LoadableState {
        self.guard.check("state");
        self.state.get()
    }

    fn error(&self) -> Option<SyncError> {
        self.guard.check("error");
        self.error.borrow().clone()
    }

    fn is_contents_available(&self) -> bool {
        self.guard.check("is_contents_available");
        self.state.get().is_synced()
    }

    fn add_observer(&self, observer: &Rc<dyn LoadableObserver>) {
        self.guard.check("add_observer");
        self.hub.add(observer);
    }

    fn remove_observer(&self, observer: &Rc<dyn LoadableObserver>) {
        self.guard.check("remove_observer");
        self.hub.remove(observer);
    }

    fn has_observers(&self) -> bool {
        self.guard.check("has_observers");
        self.hub.has_observers()
    }
}

impl<L: Loadable + ?Sized + 'static> Loadable for Group<L> {
    /// Forward the sync request to every child.
    fn sync(&self) {
        self.guard.check("sync");
        let children = self.children.borrow().clone();
        for child in &children {
            child.sync();
        }
    }

    fn sync_if_needed(&self) {
        self.guard.check("sync_if_needed");
        let children = self.children.borrow().clone();
        for child in &children {
            child.sync_if_needed();
        }
    }

    fn needs_sync(&self) -> bool {
        self.guard.check("needs_sync");
        self.children.borrow().iter().any(|child| child.needs_sync())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
