//! Client-side synchronization layer for the campus school-management app.
//!
//! Several views of the same school data stay consistent with each other and
//! with the server through two mechanisms:
//! - an event bus on which every successful mutation announces itself, so
//!   that every other mounted store that depends on the changed data
//!   refetches
//! - a fixed-interval auto-refresh per store, catching changes made by other
//!   sessions that no local event reports
//!
//! # Architecture
//!
//! - `bus`: typed event vocabulary and the synchronous pub/sub bus
//! - `refresh`: the auto-refresh scheduler state machine
//! - `store`: the derived-state stores, one per slice of server data
//! - `api`: the remote API trait, its HTTP client and an in-memory backend
//! - `config`: file and environment configuration
//! - `dashboard`: one session's full set of mounted stores

pub mod api;
pub mod bus;
pub mod config;
pub mod dashboard;
pub mod refresh;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiError, HttpSchoolApi, InMemorySchoolApi, SchoolApi};
pub use bus::{AppEvent, BusEvent, EventBus, EventKind, Subscription};
pub use config::{ConfigError, SyncConfig};
pub use dashboard::{Dashboard, DashboardSummary};
pub use refresh::{RefreshConfig, RefreshError, RefreshStatus, RefreshTask};
pub use store::{LiveSlice, SliceSnapshot, SliceSource, StoreContext};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Refresh(#[from] RefreshError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Other(String),
}

impl serde::Serialize for AppError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "campus_sync=debug,info";

/// Install the global `tracing` subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_wraps_module_errors() {
        let error: AppError = ApiError::NotFound("grade 7".to_string()).into();
        assert_eq!(error.to_string(), "not found: grade 7");

        let error: AppError = RefreshError::NoRuntime.into();
        assert!(matches!(error, AppError::Refresh(RefreshError::NoRuntime)));

        let error: AppError = ConfigError::Invalid("api_base_url is empty".to_string()).into();
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            "\"invalid config: api_base_url is empty\""
        );
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
