#![forbid(unsafe_code)]

//! Observer registration and change fan-out.
//!
//! [`ObserverHub`] manages a dynamic set of observers for one loadable. It
//! stores observers as `Weak` references in registration order and never
//! extends an observer's lifetime.
//!
//! # Invariants
//!
//! 1. Registration is idempotent: adding an already-registered observer does
//!    not duplicate notifications.
//! 2. Delivery happens in registration order.
//! 3. The first-observer hook fires exactly once per 0→1 transition of the
//!    live observer count; the last-observer hook exactly once per 1→0
//!    transition. Neither fires for transitions that don't cross that
//!    boundary.
//! 4. [`notify`](ObserverHub::notify) works from a snapshot: an observer
//!    adding or removing observers during delivery neither corrupts
//!    iteration nor causes re-entrant delivery within the same cycle.
//!    Observers added mid-cycle are not delivered to; observers removed
//!    mid-cycle are skipped.
//!
//! # Failure Modes
//!
//! - An observer dropped without deregistering is detected lazily at the
//!   next hub operation; until then `has_observers()` already ignores it,
//!   but the last-observer hook only fires from an explicit `remove`. The
//!   RAII [`ObserverGuard`] exists precisely so this path stays rare.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::loadable::PureLoadable;

/// A listener notified after every committed state change of an observed
/// loadable.
///
/// Observers capture whatever context they need; the callback deliberately
/// takes no sender argument.
pub trait LoadableObserver {
    /// Called after the observed loadable committed a change, so the
    /// post-transition state is already visible through its accessors.
    fn loadable_did_change(&self);
}

type Hook = Rc<dyn Fn()>;

/// Ordered, weak observer registry with reentrancy-safe fan-out.
pub struct ObserverHub {
    observers: RefCell<Vec<Weak<dyn LoadableObserver>>>,
    on_first: RefCell<Option<Hook>>,
    on_last: RefCell<Option<Hook>>,
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("registered", &self.observers.borrow().len())
            .finish()
    }
}

impl ObserverHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            on_first: RefCell::new(None),
            on_last: RefCell::new(None),
        }
    }

    /// Install the hook fired on every 0→1 live-count transition.
    pub fn set_on_first_observer(&self, hook: impl Fn() + 'static) {
        *self.on_first.borrow_mut() = Some(Rc::new(hook));
    }

    /// Install the hook fired on every 1→0 live-count transition.
    pub fn set_on_last_observer(&self, hook: impl Fn() + 'static) {
        *self.on_last.borrow_mut() = Some(Rc::new(hook));
    }

    /// Register an observer weakly. Idempotent.
    pub fn add(&self, observer: &Rc<dyn LoadableObserver>) {
        let fire_first = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|w| w.strong_count() > 0);
            if observers.iter().any(|w| refers_to(w, observer)) {
                return;
            }
            let was_empty = observers.is_empty();
            observers.push(Rc::downgrade(observer));
            was_empty
        };
        if fire_first {
            self.fire(&self.on_first);
        }
    }

    /// Deregister an observer. Unknown observers are ignored.
    pub fn remove(&self, observer: &Rc<dyn LoadableObserver>) {
        let fire_last = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|w| w.strong_count() > 0);
            let had_any = !observers.is_empty();
            observers.retain(|w| !refers_to(w, observer));
            had_any && observers.is_empty()
        };
        if fire_last {
            self.fire(&self.on_last);
        }
    }

    /// Whether at least one live observer is registered.
    #[must_use]
    pub fn has_observers(&self) -> bool {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|w| w.strong_count() > 0);
        !observers.is_empty()
    }

    /// Deliver a change callback to every currently registered observer, in
    /// registration order, from a snapshot taken at the start of the call.
    pub fn notify(&self) {
        let snapshot: Vec<Weak<dyn LoadableObserver>> = self.observers.borrow().clone();
        for weak in &snapshot {
            let Some(observer) = weak.upgrade() else {
                continue;
            };
            // Skip observers removed by an earlier callback in this cycle.
            let still_registered = self
                .observers
                .borrow()
                .iter()
                .any(|w| Weak::ptr_eq(w, weak));
            if still_registered {
                observer.loadable_did_change();
            }
        }
        self.observers.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn fire(&self, hook: &RefCell<Option<Hook>>) {
        // Clone out so a hook that touches the hub can't hit a live borrow.
        let hook = hook.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity comparison on the observer's data address, ignoring vtable
/// metadata (which is not guaranteed unique per object).
fn refers_to(weak: &Weak<dyn LoadableObserver>, rc: &Rc<dyn LoadableObserver>) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(rc))
}

// ---------------------------------------------------------------------------
// ObserverGuard
// ---------------------------------------------------------------------------

struct CallbackObserver {
    callback: Box<dyn Fn()>,
}

impl LoadableObserver for CallbackObserver {
    fn loadable_did_change(&self) {
        (self.callback)();
    }
}

/// RAII observer registration.
///
/// Wraps a callback closure in an observer, registers it with a loadable,
/// and deregisters on drop. The guard holds the observed loadable *weakly*,
/// so keeping a guard around never keeps the loadable alive; if the loadable
/// is gone by the time the guard drops, there is nothing to deregister from.
pub struct ObserverGuard {
    observer: Rc<dyn LoadableObserver>,
    detach: Option<Box<dyn FnOnce(&Rc<dyn LoadableObserver>)>>,
}

impl ObserverGuard {
    /// Register `callback` as an observer of `loadable` for the lifetime of
    /// the returned guard.
    pub fn observing<L>(loadable: &Rc<L>, callback: impl Fn() + 'static) -> Self
    where
        L: PureLoadable + ?Sized + 'static,
    {
        let observer: Rc<dyn LoadableObserver> = Rc::new(CallbackObserver {
            callback: Box::new(callback),
        });
        loadable.add_observer(&observer);
        let weak = Rc::downgrade(loadable);
        Self {
            observer,
            detach: Some(Box::new(move |observer| {
                if let Some(loadable) = weak.upgrade() {
                    loadable.remove_observer(observer);
                }
            })),
        }
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach(&self.observer);
        }
    }
}

impl std::fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverGuard").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        count: Cell<u32>,
    }

    impl Counter {
        fn shared() -> Rc<Self> {
            Rc::new(Self {
                count: Cell::new(0),
            })
        }
    }

    impl LoadableObserver for Counter {
        fn loadable_did_change(&self) {
            self.count.set(self.count.get() + 1);
        }
    }

    fn as_observer(counter: &Rc<Counter>) -> Rc<dyn LoadableObserver> {
        Rc::clone(counter) as Rc<dyn LoadableObserver>
    }

    #[test]
    fn notify_delivers_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));

        struct Recorder {
            order: Rc<RefCell<Vec<&'static str>>>,
            name: &'static str,
        }
        impl LoadableObserver for Recorder {
            fn loadable_did_change(&self) {
                self.order.borrow_mut().push(self.name);
            }
        }

        let hub = ObserverHub::new();
        let a: Rc<dyn LoadableObserver> = Rc::new(Recorder {
            order: Rc::clone(&order),
            name: "a",
        });
        let b: Rc<dyn LoadableObserver> = Rc::new(Recorder {
            order: Rc::clone(&order),
            name: "b",
        });
        hub.add(&a);
        hub.add(&b);
        hub.notify();
        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn add_is_idempotent() {
        let hub = ObserverHub::new();
        let counter = Counter::shared();
        let observer = as_observer(&counter);
        hub.add(&observer);
        hub.add(&observer);
        hub.notify();
        assert_eq!(counter.count.get(), 1);
    }

    #[test]
    fn remove_stops_delivery() {
        let hub = ObserverHub::new();
        let counter = Counter::shared();
        let observer = as_observer(&counter);
        hub.add(&observer);
        hub.notify();
        hub.remove(&observer);
        hub.notify();
        assert_eq!(counter.count.get(), 1);
    }

    #[test]
    fn hub_does_not_keep_observers_alive() {
        let hub = ObserverHub::new();
        {
            let counter = Counter::shared();
            let observer = as_observer(&counter);
            hub.add(&observer);
            assert!(hub.has_observers());
        }
        assert!(!hub.has_observers());
        hub.notify(); // Nothing to deliver, nothing to panic about.
    }

    #[test]
    fn first_and_last_hooks_fire_on_boundary_crossings() {
        let hub = Rc::new(ObserverHub::new());
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

        let a = as_observer(&Counter::shared());
        let b = as_observer(&Counter::shared());

        hub.add(&a); // 0 → 1
        assert_eq!((firsts.get(), lasts.get()), (1, 0));
        hub.add(&b); // 1 → 2: no hook
        assert_eq!((firsts.get(), lasts.get()), (1, 0));
        hub.remove(&a); // 2 → 1: no hook
        assert_eq!((firsts.get(), lasts.get()), (1, 0));
        hub.remove(&b); // 1 → 0
        assert_eq!((firsts.get(), lasts.get()), (1, 1));
        hub.add(&a); // 0 → 1 again
        assert_eq!((firsts.get(), lasts.get()), (2, 1));
    }

    #[test]
    fn removing_unknown_observer_is_ignored() {
        let hub = ObserverHub::new();
        let lasts = Rc::new(Cell::new(0u32));
        {
            let lasts = Rc::clone(&lasts);
            hub.set_on_last_observer(move || lasts.set(lasts.get() + 1));
        }
        let stranger = as_observer(&Counter::shared());
        hub.remove(&stranger);
        assert_eq!(lasts.get(), 0);
    }

    #[test]
    fn observer_removed_mid_cycle_is_skipped() {
        let hub = Rc::new(ObserverHub::new());
        let counter = Counter::shared();
        let victim = as_observer(&counter);

        struct Remover {
            hub: Rc<ObserverHub>,
            victim: Rc<dyn LoadableObserver>,
        }
        impl LoadableObserver for Remover {
            fn loadable_did_change(&self) {
                self.hub.remove(&self.victim);
            }
        }

        let remover: Rc<dyn LoadableObserver> = Rc::new(Remover {
            hub: Rc::clone(&hub),
            victim: Rc::clone(&victim),
        });
        hub.add(&remover);
        hub.add(&victim);
        hub.notify();
        // The remover ran first and pulled the victim out of the cycle.
        assert_eq!(counter.count.get(), 0);
    }

    #[test]
    fn observer_added_mid_cycle_waits_for_next_cycle() {
        let hub = Rc::new(ObserverHub::new());
        let late = Counter::shared();

        struct Adder {
            hub: Rc<ObserverHub>,
            late: Rc<dyn LoadableObserver>,
        }
        impl LoadableObserver for Adder {
            fn loadable_did_change(&self) {
                self.hub.add(&self.late);
            }
        }

        let adder: Rc<dyn LoadableObserver> = Rc::new(Adder {
            hub: Rc::clone(&hub),
            late: as_observer(&late),
        });
        hub.add(&adder);
        hub.notify();
        assert_eq!(late.count.get(), 0);
        hub.notify();
        assert_eq!(late.count.get(), 1);
    }
}
