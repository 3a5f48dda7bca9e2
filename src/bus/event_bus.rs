use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use super::event_types::{AppEvent, EventKind};

/// Callback invoked synchronously for every matching event.
pub type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    pub seq: i64,
    /// Store instance that produced the event, if any.
    pub origin: Option<Uuid>,
    #[serde(flatten)]
    pub event: AppEvent,
    pub emitted_at: String,
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

#[derive(Clone)]
struct Registration {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    listeners: DashMap<EventKind, Vec<Registration>>,
    next_id: AtomicU64,
    seq: AtomicI64,
}

impl Registry {
    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let removed = match self.listeners.get_mut(&kind) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|registration| registration.id != id);
                entry.len() != before
            }
            None => false,
        };
        self.listeners.remove_if(&kind, |_, entries| entries.is_empty());
        removed
    }

    /// Copy of the listener list for `kind`, taken without holding the shard
    /// lock while listeners run.
    fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|entry| {
                entry
                    .iter()
                    .map(|registration| registration.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Process-wide publish/subscribe registry keyed by [`EventKind`].
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

static GLOBAL_BUS: OnceLock<EventBus> = OnceLock::new();

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bus shared by everything in this process.
    pub fn global() -> &'static EventBus {
        GLOBAL_BUS.get_or_init(EventBus::new)
    }

    /// Register `listener` for `kind`. The registration lives until the
    /// returned [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(listener))
    }

    /// Register one listener under several kinds.
    pub fn subscribe_many<F>(&self, kinds: &[EventKind], listener: F) -> Vec<Subscription>
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        kinds
            .iter()
            .map(|kind| self.register(*kind, listener.clone()))
            .collect()
    }

    fn register(&self, kind: EventKind, listener: Listener) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .entry(kind)
            .or_default()
            .push(Registration { id, listener });
        tracing::trace!(event = %kind, subscription = id, "listener subscribed");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Build and deliver an event with no producing store.
    pub fn emit(&self, event: AppEvent) -> BusEvent {
        self.emit_with_origin(None, event)
    }

    /// Build and deliver an event produced by the store instance `origin`.
    pub fn emit_from(&self, origin: Uuid, event: AppEvent) -> BusEvent {
        self.emit_with_origin(Some(origin), event)
    }

    fn emit_with_origin(&self, origin: Option<Uuid>, event: AppEvent) -> BusEvent {
        let bus_event = BusEvent {
            seq: self.registry.seq.fetch_add(1, Ordering::Relaxed),
            origin,
            event,
            emitted_at: Utc::now().to_rfc3339(),
        };
        self.publish(&bus_event);
        bus_event
    }

    /// Deliver a pre-built event to the listeners registered for its kind at
    /// the moment of the call. Returns how many listeners ran to completion.
    pub fn publish(&self, event: &BusEvent) -> usize {
        let kind = event.kind();
        let listeners = self.registry.snapshot(kind);
        if listeners.is_empty() {
            tracing::trace!(event = %kind, "no listeners, event dropped");
            return 0;
        }

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        event = %kind,
                        seq = event.seq,
                        "event listener panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        tracing::debug!(event = %kind, seq = event.seq, delivered, "event emitted");
        delivered
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .listeners
            .get(&kind)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

/// Handle to one listener registration. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<Registry>,
    kind: EventKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove this registration. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(self.kind, self.id);
        tracing::trace!(event = %self.kind, subscription = self.id, "listener unsubscribed");
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use super::*;
    use crate::bus::event_types::RecordRef;

    fn grade_deleted(id: i64) -> AppEvent {
        AppEvent::GradeDeleted(RecordRef { id })
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&BusEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move |_: &BusEvent| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_emit_without_listeners_is_silent() {
        let bus = EventBus::new();
        let event = bus.emit(grade_deleted(1));
        assert_eq!(event.seq, 0);
        assert_eq!(bus.publish(&event), 0);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for n in 0..3 {
            let order = order.clone();
            subs.push(bus.subscribe(EventKind::GradeDeleted, move |_| {
                order.lock().unwrap().push(n);
            }));
        }

        bus.emit(grade_deleted(1));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_siblings() {
        let bus = EventBus::new();
        let _first = bus.subscribe(EventKind::GradeUpdated, |_| panic!("listener blew up"));
        let (count, listener) = counter();
        let _second = bus.subscribe(EventKind::GradeUpdated, listener);

        let grade = crate::api::types::Grade {
            id: 3,
            student_id: 1,
            course_id: 10,
            score: 55.0,
            term: "2026-T1".to_string(),
            remarks: None,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let event = bus.emit(AppEvent::GradeUpdated(grade));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.publish(&event), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let (count, listener) = counter();
        let sub = bus.subscribe(EventKind::GradeDeleted, listener);
        let (other_count, other) = counter();
        let _other = bus.subscribe(EventKind::GradeDeleted, other);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert_eq!(bus.listener_count(EventKind::GradeDeleted), 1);

        bus.emit(grade_deleted(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(other_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let (count, listener) = counter();
        {
            let _sub = bus.subscribe(EventKind::FeedbackDeleted, listener);
            assert_eq!(bus.listener_count(EventKind::FeedbackDeleted), 1);
        }
        assert_eq!(bus.listener_count(EventKind::FeedbackDeleted), 0);
        bus.emit(AppEvent::FeedbackDeleted(RecordRef { id: 9 }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribe_during_emit_applies_to_next_emit() {
        let bus = EventBus::new();
        let late_count = Arc::new(AtomicUsize::new(0));
        let late_subs = Arc::new(Mutex::new(Vec::new()));

        let _outer = {
            let bus_inner = bus.clone();
            let late_count = late_count.clone();
            let late_subs = late_subs.clone();
            bus.subscribe(EventKind::GradeDeleted, move |_| {
                let late_count = late_count.clone();
                let sub = bus_inner.subscribe(EventKind::GradeDeleted, move |_| {
                    late_count.fetch_add(1, Ordering::SeqCst);
                });
                late_subs.lock().unwrap().push(sub);
            })
        };

        bus.emit(grade_deleted(1));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        bus.emit(grade_deleted(2));
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself_mid_emit() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let sub = {
            let slot = slot.clone();
            let calls = calls.clone();
            bus.subscribe(EventKind::GradeDeleted, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(sub) = slot.lock().unwrap().as_ref() {
                    sub.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(sub);
        let (tail_count, tail) = counter();
        let _tail = bus.subscribe(EventKind::GradeDeleted, tail);

        bus.emit(grade_deleted(1));
        bus.emit(grade_deleted(2));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tail_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reentrant_emit_from_listener() {
        let bus = EventBus::new();
        let (count, listener) = counter();
        let _sink = bus.subscribe(EventKind::CourseRequestApproved, listener);
        let _relay = {
            let bus_inner = bus.clone();
            bus.subscribe(EventKind::EnrollmentRequestApproved, move |event| {
                bus_inner.emit(AppEvent::CourseRequestApproved(RecordRef {
                    id: event.event.record_id(),
                }));
            })
        };

        bus.emit(AppEvent::EnrollmentRequestApproved(RecordRef { id: 42 }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_many_and_origin() {
        let bus = EventBus::new();
        let origin = Uuid::new_v4();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subs = {
            let seen = seen.clone();
            bus.subscribe_many(
                &[EventKind::GradeDeleted, EventKind::FeedbackDeleted],
                move |event| seen.lock().unwrap().push((event.kind(), event.origin)),
            )
        };
        assert_eq!(subs.len(), 2);

        bus.emit_from(origin, grade_deleted(1));
        bus.emit(AppEvent::FeedbackDeleted(RecordRef { id: 2 }));
        bus.emit(AppEvent::CourseRequestDeclined(RecordRef { id: 3 }));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (EventKind::GradeDeleted, Some(origin)),
                (EventKind::FeedbackDeleted, None),
            ]
        );
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::GradeCreated, |_| {});
        drop(bus);
        assert!(!sub.unsubscribe());
    }
}
