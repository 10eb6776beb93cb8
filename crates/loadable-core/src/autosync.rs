#![forbid(unsafe_code)]

//! Periodic refresh driven by a cooperative clock.
//!
//! [`AutosyncLoadable`] wraps a syncable loadable and asks it to
//! `sync_if_needed` on a fixed cadence. There is no background thread and no
//! timer registration: the host application forwards elapsed time through
//! [`tick`](AutosyncLoadable::tick) (or the convenience
//! [`tick_now`](AutosyncLoadable::tick_now)) from whatever event loop it
//! already runs, and the wrapper fires when enough time has accumulated.
//!
//! Two cadences exist, selected by the current [`AppPhase`]: a foreground
//! interval and a background one. The background interval defaults to zero,
//! which disables refreshes entirely while backgrounded; apps that want
//! slower-but-alive background polling set it explicitly.
//!
//! The wrapper is transparent to observers: subscribing to it subscribes to
//! the wrapped loadable, so consumers can treat an autosynced value exactly
//! like a plain one.
//!
//! # Invariants
//!
//! 1. A refresh fires at most once per elapsed interval; switching phases
//!    resets the accumulator so a cadence change never causes an immediate
//!    double-fire.
//! 2. A zero interval holds the accumulator at zero; time passed while
//!    disabled never counts toward a later enabled cadence.
//! 3. After [`tear_down`](AutosyncLoadable::tear_down) the wrapper never
//!    syncs again, regardless of ticks.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use crate::concurrency::{ConcurrencyGuard, ConcurrencyPolicy};
use crate::loadable::{Loadable, PureLoadable};
use crate::observer::LoadableObserver;
use crate::state::{LoadableState, SyncError};

/// Whether the host application is frontmost or backgrounded, for cadence
/// selection. Reported by the host; the library never guesses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppPhase {
    #[default]
    Foreground,
    Background,
}

/// Wraps a [`Loadable`] and re-syncs it periodically. See the
/// [module docs](self).
pub struct AutosyncLoadable {
    guard: ConcurrencyGuard,
    wrapped: Rc<dyn Loadable>,
    foreground_interval: Cell<Duration>,
    background_interval: Cell<Duration>,
    phase: Cell<AppPhase>,
    accumulated: Cell<Duration>,
    last_instant: Cell<Option<Instant>>,
    torn_down: Cell<bool>,
}

impl std::fmt::Debug for AutosyncLoadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutosyncLoadable")
            .field("foreground_interval", &self.foreground_interval.get())
            .field("background_interval", &self.background_interval.get())
            .field("phase", &self.phase.get())
            .field("torn_down", &self.torn_down.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction and configuration
// ---------------------------------------------------------------------------

impl AutosyncLoadable {
    /// Wrap `loadable`, refreshing it every `foreground_interval` while the
    /// app is frontmost. Background refreshes start disabled; see
    /// [`set_background_interval`](Self::set_background_interval).
    ///
    /// The cadence is armed immediately: the first refresh fires one full
    /// interval after construction, not at construction.
    #[must_use]
    pub fn new(loadable: Rc<dyn Loadable>, foreground_interval: Duration) -> Rc<Self> {
        Self::with_concurrency(loadable, foreground_interval, ConcurrencyPolicy::default())
    }

    /// Like [`new`](Self::new) with an explicit concurrency policy.
    #[must_use]
    pub fn with_concurrency(
        loadable: Rc<dyn Loadable>,
        foreground_interval: Duration,
        policy: ConcurrencyPolicy,
    ) -> Rc<Self> {
        Rc::new(Self {
            guard: ConcurrencyGuard::new(policy),
            wrapped: loadable,
            foreground_interval: Cell::new(foreground_interval),
            background_interval: Cell::new(Duration::ZERO),
            phase: Cell::new(AppPhase::default()),
            accumulated: Cell::new(Duration::ZERO),
            last_instant: Cell::new(None),
            torn_down: Cell::new(false),
        })
    }

    /// Cadence while [`AppPhase::Foreground`]. Zero disables refreshes.
    pub fn set_foreground_interval(&self, interval: Duration) {
        self.guard.check("set_foreground_interval");
        self.foreground_interval.set(interval);
    }

    #[must_use]
    pub fn foreground_interval(&self) -> Duration {
        self.guard.check("foreground_interval");
        self.foreground_interval.get()
    }

    /// Cadence while [`AppPhase::Background`]. Zero (the default) disables
    /// background refreshes.
    pub fn set_background_interval(&self, interval: Duration) {
        self.guard.check("set_background_interval");
        self.background_interval.set(interval);
    }

    #[must_use]
    pub fn background_interval(&self) -> Duration {
        self.guard.check("background_interval");
        self.background_interval.get()
    }

    /// The wrapped loadable.
    #[must_use]
    pub fn wrapped(&self) -> Rc<dyn Loadable> {
        Rc::clone(&self.wrapped)
    }

    #[must_use]
    pub fn phase(&self) -> AppPhase {
        self.guard.check("phase");
        self.phase.get()
    }

    /// Record a foreground/background transition. An actual change restarts
    /// the cadence from zero; reporting the current phase again is a no-op.
    pub fn set_phase(&self, phase: AppPhase) {
        self.guard.check("set_phase");
        if self.phase.get() == phase {
            return;
        }
        self.phase.set(phase);
        self.accumulated.set(Duration::ZERO);
        #[cfg(feature = "tracing")]
        tracing::trace!(message = "autosync.set_phase", phase = ?phase);
    }

    /// Stop refreshing permanently. Reads and manual syncs on the wrapped
    /// loadable keep working; only the cadence dies.
    pub fn tear_down(&self) {
        self.guard.check("tear_down");
        self.torn_down.set(true);
        self.accumulated.set(Duration::ZERO);
        #[cfg(feature = "tracing")]
        tracing::trace!(message = "autosync.tear_down");
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

impl AutosyncLoadable {
    /// Advance the cadence clock by `elapsed`, firing `sync_if_needed` on the
    /// wrapped loadable once per full interval that has passed.
    ///
    /// A large `elapsed` spanning several intervals fires once per interval,
    /// so a stalled event loop catches up rather than silently dropping
    /// refreshes.
    pub fn tick(&self, elapsed: Duration) {
        self.guard.check("tick");
        if self.torn_down.get() {
            return;
        }
        let interval = match self.phase.get() {
            AppPhase::Foreground => self.foreground_interval.get(),
            AppPhase::Background => self.background_interval.get(),
        };
        if interval.is_zero() {
            // Disabled; idle time must not count toward a later cadence.
            self.accumulated.set(Duration::ZERO);
            return;
        }
        let mut accumulated = self.accumulated.get().saturating_add(elapsed);
        while accumulated >= interval {
            accumulated -= interval;
            #[cfg(feature = "tracing")]
            tracing::trace!(message = "autosync.fire", interval = ?interval);
            self.wrapped.sync_if_needed();
            if self.torn_down.get() {
                return;
            }
        }
        self.accumulated.set(accumulated);
    }

    /// [`tick`](Self::tick) with the wall-clock time elapsed since the
    /// previous `tick_now` call. The first call only arms the clock.
    pub fn tick_now(&self) {
        self.guard.check("tick_now");
        let now = Instant::now();
        let elapsed = self
            .last_instant
            .get()
            .map(|previous| now.saturating_duration_since(previous));
        self.last_instant.set(Some(now));
        if let Some(elapsed) = elapsed {
            self.tick(elapsed);
        }
    }
}

// ---------------------------------------------------------------------------
// Transparent forwarding
// ---------------------------------------------------------------------------

impl PureLoadable for AutosyncLoadable {
    fn state(&self) -> LoadableState {
        self.wrapped.state()
    }

    fn error(&self) -> Option<SyncError> {
        self.wrapped.error()
    }

    fn is_contents_available(&self) -> bool {
        self.wrapped.is_contents_available()
    }

    fn add_observer(&self, observer: &Rc<dyn LoadableObserver>) {
        self.wrapped.add_observer(observer);
    }

    fn remove_observer(&self, observer: &Rc<dyn LoadableObserver>) {
        self.wrapped.remove_observer(observer);
    }

    fn has_observers(&self) -> bool {
        self.wrapped.has_observers()
    }
}

impl Loadable for AutosyncLoadable {
    fn sync(&self) {
        self.wrapped.sync();
    }

    fn sync_if_needed(&self) {
        self.wrapped.sync_if_needed();
    }

    fn needs_sync(&self) -> bool {
        self.wrapped.needs_sync()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
