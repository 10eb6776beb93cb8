#![forbid(unsafe_code)]

//! Loadable proxies: a loadable whose state mirrors a swappable target.
//!
//! A [`Proxy`] holds zero or one target loadable and forwards reads,
//! notifications, and (for syncable targets) sync requests to it. Observers
//! subscribe to the proxy once and keep receiving changes when the
//! underlying source is swapped out — the identity of the target is the
//! proxy's own business.
//!
//! Aliases: [`PureLoadableProxy`] for read-only targets, [`LoadableProxy`]
//! for syncable ones.
//!
//! # Invariants
//!
//! 1. While a target is set, the proxy's published state equals the
//!    target's state; target changes reach the proxy's observers within the
//!    same notification cycle.
//! 2. Without a target the proxy reports neutral defaults: `Idle`, no
//!    error, contents unavailable.
//! 3. Swapping the target always notifies, even when the new target's state
//!    equals the old one's — the identity of the source changed.
//! 4. Sync requests forwarded with an absent target are no-ops.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::concurrency::{ConcurrencyGuard, ConcurrencyPolicy};
use crate::loadable::{Loadable, PureLoadable};
use crate::observer::{LoadableObserver, ObserverHub};
use crate::state::{LoadableState, SyncError};

/// A proxy over read-only loadables.
pub type PureLoadableProxy = Proxy<dyn PureLoadable>;

/// A proxy over syncable loadables; sync requests forward to the target.
pub type LoadableProxy = Proxy<dyn Loadable>;

/// A loadable forwarding everything to a swappable target. See the
/// [module docs](self).
pub struct Proxy<L: PureLoadable + ?Sized + 'static> {
    me: Weak<Proxy<L>>,
    guard: ConcurrencyGuard,
    target: RefCell<Option<Rc<L>>>,
    hub: ObserverHub,
    on_change: RefCell<Option<Rc<dyn Fn()>>>,
}

impl<L: PureLoadable + ?Sized + 'static> std::fmt::Debug for Proxy<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("has_target", &self.target.borrow().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction and target management
// ---------------------------------------------------------------------------

impl<L: PureLoadable + ?Sized + 'static> Proxy<L> {
    /// Create a proxy with no target and the default concurrency policy.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_concurrency(ConcurrencyPolicy::default())
    }

    /// Create a proxy already pointing at a target.
    #[must_use]
    pub fn with_target(target: Rc<L>) -> Rc<Self> {
        let proxy = Self::new();
        proxy.set_target(Some(target));
        proxy
    }

    /// Create a targetless proxy with an explicit concurrency policy.
    #[must_use]
    pub fn with_concurrency(policy: ConcurrencyPolicy) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            guard: ConcurrencyGuard::new(policy),
            target: RefCell::new(None),
            hub: ObserverHub::new(),
            on_change: RefCell::new(None),
        })
    }

    /// Current target, if any.
    #[must_use]
    pub fn target(&self) -> Option<Rc<L>> {
        self.guard.check("target");
        self.target.borrow().clone()
    }

    /// Replace the target: unsubscribe from the old one, store and subscribe
    /// to the new one, fire the `proxy_did_change` hook, and notify the
    /// proxy's own observers unconditionally.
    pub fn set_target(&self, target: Option<Rc<L>>) {
        self.guard.check("set_target");
        let me = self.as_observer();
        if let Some(old) = self.target.replace(target) {
            old.remove_observer(&me);
        }
        if let Some(new) = &*self.target.borrow() {
            new.add_observer(&me);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            message = "proxy.set_target",
            has_target = self.target.borrow().is_some(),
        );
        let hook = self.on_change.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.hub.notify();
    }

    /// Install the hook fired on a target swap, just before the proxy's own
    /// observers are notified.
    pub fn on_proxy_did_change(&self, hook: impl Fn() + 'static) {
        self.guard.check("on_proxy_did_change");
        *self.on_change.borrow_mut() = Some(Rc::new(hook));
    }

    fn as_observer(&self) -> Rc<dyn LoadableObserver> {
        self.me
            .upgrade()
            .expect("a proxy is always owned by the Rc created in with_concurrency")
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

impl<L: PureLoadable + ?Sized + 'static> LoadableObserver for Proxy<L> {
    /// The target changed; forward to the proxy's own observers.
    fn loadable_did_change(&self) {
        self.hub.notify();
    }
}

impl<L: PureLoadable + ?Sized + 'static> PureLoadable for Proxy<L> {
    fn state(&self) -> LoadableState {
        self.guard.check("state");
        let target = self.target.borrow().clone();
        target.map_or(LoadableState::Idle, |t| t.state())
    }

    fn error(&self) -> Option<SyncError> {
        self.guard.check("error");
        let target = self.target.borrow().clone();
        target.and_then(|t| t.error())
    }

    fn is_contents_available(&self) -> bool {
        self.guard.check("is_contents_available");
        let target = self.target.borrow().clone();
        target.is_some_and(|t| t.is_contents_available())
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

impl<L: Loadable + ?Sized + 'static> Loadable for Proxy<L> {
    fn sync(&self) {
        self.guard.check("sync");
        let target = self.target.borrow().clone();
        if let Some(target) = target {
            target.sync();
        }
    }

    fn sync_if_needed(&self) {
        self.guard.check("sync_if_needed");
        let target = self.target.borrow().clone();
        if let Some(target) = target {
            target.sync_if_needed();
        }
    }

    fn needs_sync(&self) -> bool {
        self.guard.check("needs_sync");
        let target = self.target.borrow().clone();
        target.is_some_and(|t| t.needs_sync())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
