#![forbid(unsafe_code)]

//! Observable async-value state machines.
//!
//! A *loadable* is a value fetched or computed asynchronously, modeled as a
//! small state machine: `Idle`, `Syncing`, `SyncedSuccessfully`, or
//! `FailedToSync`, plus a sticky contents-available flag that keeps a
//! previously fetched value usable while a refresh is in flight or has
//! failed. Observers register weakly and hear about every change; groups,
//! proxies, and autosync wrappers compose loadables into larger ones.
//!
//! ```
//! use std::rc::Rc;
//! use std::cell::Cell;
//! use loadable_core::{BaseLoadable, Loadable, LoadableState, ObserverGuard, PureLoadable};
//!
//! let avatar = Rc::new(BaseLoadable::new().driver(|l| {
//!     // A real driver would kick off a request and report later;
//!     // here the fetch completes immediately.
//!     l.set_did_sync_successfully();
//! }));
//!
//! let changes = Rc::new(Cell::new(0u32));
//! let seen = Rc::clone(&changes);
//! let _guard = ObserverGuard::observing(&avatar, move || seen.set(seen.get() + 1));
//!
//! avatar.sync();
//! assert_eq!(avatar.state(), LoadableState::SyncedSuccessfully);
//! assert!(avatar.is_contents_available());
//! assert_eq!(changes.get(), 2); // Syncing, then SyncedSuccessfully.
//! ```
//!
//! Everything here is single-threaded by design: loadables live on the
//! thread that owns the UI or event loop, and [`ConcurrencyGuard`] catches
//! accidental cross-thread use during development.

pub mod autosync;
pub mod concurrency;
pub mod group;
pub mod loadable;
pub mod observer;
pub mod proxy;
pub mod state;

pub use autosync::{AppPhase, AutosyncLoadable};
pub use concurrency::{set_concurrency_checks_enabled, ConcurrencyGuard, ConcurrencyPolicy};
pub use group::{Group, LoadableGroup, PureLoadableGroup};
pub use loadable::{BaseLoadable, Loadable, PureLoadable};
pub use observer::{LoadableObserver, ObserverGuard, ObserverHub};
pub use proxy::{LoadableProxy, Proxy, PureLoadableProxy};
pub use state::{LoadableState, SyncError, SyncFailed};
