#![forbid(unsafe_code)]

//! Loadable state and error values.
//!
//! [`LoadableState`] is a closed four-state enum with no behavior attached.
//! The error of the most recent failed sync is kept *next to* the state
//! rather than inside a variant, so the state itself stays `Copy` and
//! trivially comparable. Errors are opaque to the core: producers supply any
//! [`std::error::Error`] behind an [`Rc`], and groups/proxies propagate it by
//! cloning the `Rc` (by reference, never by copying the error contents).

use std::error::Error;
use std::fmt;
use std::rc::Rc;

/// The lifecycle state of a loadable.
///
/// Allowed transitions (driven by the operations on
/// [`BaseLoadable`](crate::loadable::BaseLoadable)):
///
/// - `Idle` / `SyncedSuccessfully` / `FailedToSync` → `Syncing` on a sync
///   request; a request arriving while already `Syncing` is a no-op.
/// - `Syncing` → `SyncedSuccessfully` when the producer reports success.
/// - `Syncing` → `FailedToSync` when the producer reports failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadableState {
    /// Nothing has happened to the loadable yet.
    #[default]
    Idle,
    /// A sync is in flight; completion will arrive from the producer.
    Syncing,
    /// The last sync finished successfully.
    SyncedSuccessfully,
    /// The last sync failed; see the loadable's error for details.
    FailedToSync,
}

impl LoadableState {
    /// Whether a sync is currently in flight.
    #[inline]
    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }

    /// Whether the last sync finished successfully.
    #[inline]
    #[must_use]
    pub const fn is_synced(self) -> bool {
        matches!(self, Self::SyncedSuccessfully)
    }

    /// Whether the last sync failed.
    #[inline]
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::FailedToSync)
    }
}

impl fmt::Display for LoadableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::SyncedSuccessfully => "synced successfully",
            Self::FailedToSync => "failed to sync",
        };
        f.write_str(name)
    }
}

/// An opaque, caller-supplied sync error.
///
/// Overwritten each time a loadable enters `FailedToSync`; cleared when it
/// leaves that state for `Syncing` or `SyncedSuccessfully`. No history is
/// kept.
pub type SyncError = Rc<dyn Error>;

/// A minimal concrete error for producers that have nothing richer to report.
#[derive(Debug, thiserror::Error)]
#[error("sync failed: {0}")]
pub struct SyncFailed(pub String);

impl SyncFailed {
    /// Create a `SyncFailed` with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Create a `SyncFailed` already wrapped as a shareable [`SyncError`].
    #[must_use]
    pub fn shared(message: impl Into<String>) -> SyncError {
        Rc::new(Self::new(message))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        assert_eq!(LoadableState::default(), LoadableState::Idle);
    }

    #[test]
    fn predicates() {
        assert!(LoadableState::Syncing.is_syncing());
        assert!(LoadableState::SyncedSuccessfully.is_synced());
        assert!(LoadableState::FailedToSync.is_failed());
        assert!(!LoadableState::Idle.is_syncing());
        assert!(!LoadableState::Idle.is_synced());
        assert!(!LoadableState::Idle.is_failed());
    }

    #[test]
    fn display_names() {
        assert_eq!(LoadableState::Idle.to_string(), "idle");
        assert_eq!(LoadableState::Syncing.to_string(), "syncing");
        assert_eq!(
            LoadableState::SyncedSuccessfully.to_string(),
            "synced successfully"
        );
        assert_eq!(LoadableState::FailedToSync.to_string(), "failed to sync");
    }

    #[test]
    fn sync_failed_message() {
        let err = SyncFailed::new("server returned 503");
        assert_eq!(err.to_string(), "sync failed: server returned 503");
    }

    #[test]
    fn shared_error_is_cloneable_by_reference() {
        let err = SyncFailed::shared("boom");
        let clone = Rc::clone(&err);
        assert!(Rc::ptr_eq(&err, &clone));
        assert_eq!(clone.to_string(), "sync failed: boom");
    }
}
