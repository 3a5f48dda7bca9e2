//! Event system connecting mutations in one store to refetches in others.
//!
//! The event bus provides:
//! - Publish-subscribe keyed by a closed set of event kinds
//! - Synchronous, same-call delivery to the listeners registered at emit time
//! - Per-listener failure isolation (a panicking listener is logged and skipped)
//!
//! # Delivery
//!
//! Events are not queued or persisted. If nobody is subscribed when
//! `emit` runs, the notification is gone; stores rely on their auto-refresh
//! task to catch up on anything they missed.

mod event_bus;
pub mod event_types;

pub use event_bus::{BusEvent, EventBus, Listener, Subscription};
pub use event_types::{AppEvent, Assignment, EventKind, RecordRef};

pub(crate) use event_bus::panic_message;
