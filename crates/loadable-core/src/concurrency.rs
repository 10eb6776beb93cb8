#![forbid(unsafe_code)]

//! Runtime thread-affinity checks for loadables.
//!
//! Every loadable carries a [`ConcurrencyGuard`] describing which thread is
//! allowed to touch its state. The guard exists to catch misuse during
//! development, not to provide runtime safety: the loadable types are built
//! on `Rc`/`RefCell` and are `!Send` anyway, but a guard still catches
//! producers that smuggle completion callbacks onto the wrong thread through
//! channels or scoped threads.
//!
//! # Policies
//!
//! - [`ConcurrencyPolicy::MainThread`] (default): every operation must run on
//!   the thread the loadable was created on.
//! - [`ConcurrencyPolicy::MainThreadExceptInit`]: construction may happen on
//!   a worker thread; the owning thread is adopted at the first checked
//!   operation afterwards.
//! - [`ConcurrencyPolicy::Custom`]: no checking; the caller serializes access
//!   themselves.
//!
//! # Enablement
//!
//! Checks are on in debug builds and off in release builds by default. The
//! process-global [`set_concurrency_checks_enabled`] override forces them on
//! or off at runtime, which keeps the check itself testable instead of
//! compiling it away. A violation is a programmer error and panics.

use std::cell::Cell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, ThreadId};

// ---------------------------------------------------------------------------
// Global enablement override
// ---------------------------------------------------------------------------

/// 0 = follow the build profile, 1 = forced on, 2 = forced off.
static CHECK_OVERRIDE: AtomicU8 = AtomicU8::new(0);

/// Force thread-affinity checks on (`Some(true)`), off (`Some(false)`), or
/// back to the build-profile default (`None`: on in debug, off in release).
pub fn set_concurrency_checks_enabled(enabled: Option<bool>) {
    let value = match enabled {
        None => 0,
        Some(true) => 1,
        Some(false) => 2,
    };
    CHECK_OVERRIDE.store(value, Ordering::Relaxed);
}

fn checks_enabled() -> bool {
    match CHECK_OVERRIDE.load(Ordering::Relaxed) {
        1 => true,
        2 => false,
        _ => cfg!(debug_assertions),
    }
}

// ---------------------------------------------------------------------------
// Policy and guard
// ---------------------------------------------------------------------------

/// How concurrent access to a loadable is checked at development time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// All operations must run on the thread the loadable was created on.
    #[default]
    MainThread,
    /// Construction may run elsewhere; everything else must run on the
    /// thread of the first checked operation.
    MainThreadExceptInit,
    /// Checks are disabled; exclusive access is managed by the caller.
    Custom,
}

/// Per-loadable thread-affinity checker.
///
/// Cheap to construct and to consult; when checks are disabled (release
/// builds without an override, or the `Custom` policy) [`check`](Self::check)
/// is a branch and a return.
#[derive(Debug)]
pub struct ConcurrencyGuard {
    policy: ConcurrencyPolicy,
    owner: Cell<Option<ThreadId>>,
}

impl ConcurrencyGuard {
    /// Create a guard for the given policy.
    ///
    /// Under `MainThread` the current thread becomes the owner immediately;
    /// under `MainThreadExceptInit` the owner is adopted at the first checked
    /// operation.
    #[must_use]
    pub fn new(policy: ConcurrencyPolicy) -> Self {
        let owner = match policy {
            ConcurrencyPolicy::MainThread => Some(thread::current().id()),
            _ => None,
        };
        Self {
            policy,
            owner: Cell::new(owner),
        }
    }

    /// The policy this guard was created with.
    #[must_use]
    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Assert that the calling thread is allowed to perform `operation`.
    ///
    /// # Panics
    ///
    /// Panics when checks are enabled and the calling thread differs from
    /// the owning thread. This is a development aid for catching misuse, not
    /// a recoverable condition.
    pub fn check(&self, operation: &'static str) {
        if self.policy == ConcurrencyPolicy::Custom {
            return;
        }
        let current = thread::current().id();
        match self.owner.get() {
            // Ownership is adopted even while checks are off, so toggling
            // them on later still knows who the owner is.
            None => self.owner.set(Some(current)),
            Some(owner) if owner == current => {}
            Some(owner) => {
                if checks_enabled() {
                    panic!(
                        "`{operation}` called from {current:?}, but this loadable is owned by \
                         {owner:?} (policy {:?})",
                        self.policy
                    );
                }
            }
        }
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(ConcurrencyPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
