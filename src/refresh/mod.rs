//! Fixed-interval auto-refresh used as the fallback consistency path for
//! every store.

mod scheduler;

pub use scheduler::{
    refresh_fn, RefreshConfig, RefreshError, RefreshFn, RefreshFuture, RefreshStatus,
    RefreshTask, DEFAULT_REFRESH_INTERVAL_MS,
};
