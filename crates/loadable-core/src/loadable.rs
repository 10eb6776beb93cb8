#![forbid(unsafe_code)]

//! The loadable contract and the producer-facing base implementation.
//!
//! # Design
//!
//! The surface splits in two layers:
//!
//! - [`PureLoadable`] is the narrow caller-facing contract: read the state,
//!   the error, the contents-available flag, and (de)register observers.
//! - [`Loadable`] adds the sync triggers for loadables that can refresh
//!   themselves.
//!
//! [`BaseLoadable`] is the concrete building block producers compose with.
//! Producer behavior is injected as closures instead of subclass overrides:
//! a *sync driver* invoked after the transition to `Syncing`, and an
//! optional *needs-sync* predicate. The transition setters (`set_syncing`,
//! `set_did_sync_successfully`, `set_failed_to_sync`) are inherent methods —
//! they belong to the producer implementing the loadable, not to general
//! callers, which should only ever see the two traits.
//!
//! # Invariants
//!
//! 1. A sync request while already `Syncing` is a no-op: no restart, no
//!    queuing, no notification.
//! 2. Every transition that changes the state fires exactly one notification
//!    *after* the state field is updated, so observers always read the
//!    post-transition state.
//! 3. Entering `Syncing` or `SyncedSuccessfully` clears the stored error;
//!    entering `FailedToSync` overwrites it.
//! 4. `contents_available` becomes true on success and sticks across later
//!    failures and re-syncs until explicitly cleared.
//! 5. `sync()` never blocks: it marks intent, notifies, runs the driver, and
//!    returns. Completion arrives whenever the producer reports it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::concurrency::{ConcurrencyGuard, ConcurrencyPolicy};
use crate::observer::{LoadableObserver, ObserverHub};
use crate::state::{LoadableState, SyncError};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read-and-observe surface of a loadable.
///
/// This is all a general caller gets: the sync triggers live on
/// [`Loadable`], and the transition setters are inherent to the concrete
/// producer type.
pub trait PureLoadable {
    /// Current lifecycle state.
    fn state(&self) -> LoadableState;

    /// Error of the most recent failed sync. Meaningful only while the state
    /// is `FailedToSync`.
    fn error(&self) -> Option<SyncError>;

    /// Whether a successful sync has ever produced a usable value that is
    /// still considered available.
    fn is_contents_available(&self) -> bool;

    /// Register an observer. Idempotent; the loadable holds it weakly.
    fn add_observer(&self, observer: &Rc<dyn LoadableObserver>);

    /// Deregister an observer. Unknown observers are ignored.
    fn remove_observer(&self, observer: &Rc<dyn LoadableObserver>);

    /// Whether at least one observer is currently registered.
    fn has_observers(&self) -> bool;
}

/// A loadable that can refresh itself on request.
pub trait Loadable: PureLoadable {
    /// Request a (re)sync. No-op while a sync is already in flight.
    fn sync(&self);

    /// Request a sync only if [`needs_sync`](Self::needs_sync) holds.
    fn sync_if_needed(&self);

    /// Whether `sync_if_needed` would actually trigger a sync right now.
    /// Defaults to "contents not yet available" on [`BaseLoadable`].
    fn needs_sync(&self) -> bool;
}

// ---------------------------------------------------------------------------
// BaseLoadable
// ---------------------------------------------------------------------------

type SyncDriver = Box<dyn Fn(&BaseLoadable)>;
type NeedsSyncPredicate = Box<dyn Fn(&BaseLoadable) -> bool>;

/// Concrete loadable building block for producers.
///
/// Typical use: wrap in an `Rc`, hand the `Rc` to callers as
/// `Rc<dyn Loadable>`, and drive the transitions from the producer side.
/// Producers with extra state of their own embed a `BaseLoadable` and
/// forward the two traits to it.
pub struct BaseLoadable {
    guard: ConcurrencyGuard,
    state: Cell<LoadableState>,
    error: RefCell<Option<SyncError>>,
    contents_available: Cell<bool>,
    hub: ObserverHub,
    driver: Option<SyncDriver>,
    needs_sync_override: Option<NeedsSyncPredicate>,
}

impl std::fmt::Debug for BaseLoadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseLoadable")
            .field("state", &self.state.get())
            .field("contents_available", &self.contents_available.get())
            .field("has_driver", &self.driver.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl BaseLoadable {
    /// Create an idle loadable with the default (main-thread) concurrency
    /// policy and no driver.
    #[must_use]
    pub fn new() -> Self {
        Self::with_concurrency(ConcurrencyPolicy::default())
    }

    /// Create an idle loadable with an explicit concurrency policy.
    #[must_use]
    pub fn with_concurrency(policy: ConcurrencyPolicy) -> Self {
        Self {
            guard: ConcurrencyGuard::new(policy),
            state: Cell::new(LoadableState::Idle),
            error: RefCell::new(None),
            contents_available: Cell::new(false),
            hub: ObserverHub::new(),
            driver: None,
            needs_sync_override: None,
        }
    }

    /// Install the sync driver (builder pattern).
    ///
    /// The driver runs inside `sync()`, after the state has moved to
    /// `Syncing` and observers have been notified. It must eventually report
    /// completion through [`set_did_sync_successfully`](Self::set_did_sync_successfully)
    /// or [`set_failed_to_sync`](Self::set_failed_to_sync) — possibly much
    /// later. Without a driver the loadable stays `Syncing` until some
    /// external producer reports.
    #[must_use]
    pub fn driver(mut self, driver: impl Fn(&BaseLoadable) + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    /// Override the needs-sync predicate (builder pattern).
    ///
    /// The default is "contents not yet available"; a common override adds
    /// "or the last sync failed".
    #[must_use]
    pub fn needs_sync_when(mut self, predicate: impl Fn(&BaseLoadable) -> bool + 'static) -> Self {
        self.needs_sync_override = Some(Box::new(predicate));
        self
    }
}

impl Default for BaseLoadable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Producer surface
// ---------------------------------------------------------------------------

impl BaseLoadable {
    /// Transition into `Syncing`. No-op (and no notification) if already
    /// syncing.
    pub fn set_syncing(&self) {
        self.guard.check("set_syncing");
        self.transition(LoadableState::Syncing);
    }

    /// Report success: state becomes `SyncedSuccessfully`, the error is
    /// cleared, and contents become available.
    pub fn set_did_sync_successfully(&self) {
        self.guard.check("set_did_sync_successfully");
        self.contents_available.set(true);
        self.transition(LoadableState::SyncedSuccessfully);
    }

    /// Report failure with an optional error. Contents availability is
    /// unchanged: a previously fetched value stays usable.
    ///
    /// Always notifies, even when the state was already `FailedToSync` —
    /// the error payload changed.
    pub fn set_failed_to_sync(&self, error: Option<SyncError>) {
        self.guard.check("set_failed_to_sync");
        #[cfg(feature = "tracing")]
        tracing::trace!(
            message = "loadable.transition",
            from = ?self.state.get(),
            to = ?LoadableState::FailedToSync,
            error = error.as_deref().map(tracing::field::display),
        );
        *self.error.borrow_mut() = error;
        self.state.set(LoadableState::FailedToSync);
        self.hub.notify();
    }

    /// Explicitly set or clear the contents-available flag. Does not notify;
    /// pair with [`notify_did_change`](Self::notify_did_change) if observers
    /// should hear about it.
    pub fn set_contents_available(&self, available: bool) {
        self.guard.check("set_contents_available");
        self.contents_available.set(available);
    }

    /// Notify observers about a producer-defined change that is not a state
    /// transition (sub-state, progress, a refreshed value under the same
    /// state).
    pub fn notify_did_change(&self) {
        self.guard.check("notify_did_change");
        self.hub.notify();
    }

    /// Install a hook fired when the first observer is added (0→1).
    pub fn on_first_observer(&self, hook: impl Fn() + 'static) {
        self.guard.check("on_first_observer");
        self.hub.set_on_first_observer(hook);
    }

    /// Install a hook fired when the last observer is removed (1→0).
    pub fn on_last_observer(&self, hook: impl Fn() + 'static) {
        self.guard.check("on_last_observer");
        self.hub.set_on_last_observer(hook);
    }

    fn transition(&self, to: LoadableState) {
        let from = self.state.get();
        if from == to {
            return;
        }
        if matches!(
            to,
            LoadableState::Syncing | LoadableState::SyncedSuccessfully
        ) {
            self.error.borrow_mut().take();
        }
        self.state.set(to);
        #[cfg(feature = "tracing")]
        tracing::trace!(message = "loadable.transition", from = ?from, to = ?to);
        self.hub.notify();
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl PureLoadable for BaseLoadable {
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
        self.contents_available.get()
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

impl Loadable for BaseLoadable {
    fn sync(&self) {
        self.guard.check("sync");
        if self.state.get().is_syncing() {
            return;
        }
        self.transition(LoadableState::Syncing);
        if let Some(driver) = &self.driver {
            driver(self);
        }
    }

    fn sync_if_needed(&self) {
        self.guard.check("sync_if_needed");
        if self.needs_sync() {
            self.sync();
        }
    }

    fn needs_sync(&self) -> bool {
        self.guard.check("needs_sync");
        match &self.needs_sync_override {
            Some(predicate) => predicate(self),
            None => !self.contents_available.get(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
