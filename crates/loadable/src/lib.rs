#![forbid(unsafe_code)]

//! Facade crate: one `use loadable::prelude::*;` away from the whole API.
//!
//! The implementation lives in `loadable-core`; this crate re-exports it so
//! applications depend on a single stable name while the internals stay free
//! to split further.

pub use loadable_core::{
    set_concurrency_checks_enabled, AppPhase, AutosyncLoadable, BaseLoadable, ConcurrencyGuard,
    ConcurrencyPolicy, Group, Loadable, LoadableGroup, LoadableObserver, LoadableProxy,
    LoadableState, ObserverGuard, ObserverHub, Proxy, PureLoadable, PureLoadableGroup,
    PureLoadableProxy, SyncError, SyncFailed,
};

/// The names almost every consumer wants in scope.
pub mod prelude {
    pub use loadable_core::{
        AppPhase, AutosyncLoadable, BaseLoadable, Loadable, LoadableGroup, LoadableObserver,
        LoadableProxy, LoadableState, ObserverGuard, PureLoadable, PureLoadableGroup,
        PureLoadableProxy, SyncError, SyncFailed,
    };
}
