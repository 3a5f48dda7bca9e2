//! Shared helpers for the synchronization integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use campus_sync::store::StoreContext;
use campus_sync::{EventBus, EventKind, InMemorySchoolApi, RefreshConfig, Subscription};

/// Ids assigned by `InMemorySchoolApi::with_demo_data`.
pub const PENDING_MATH_REQUEST: i64 = 11;
pub const PENDING_PHYSICS_REQUEST: i64 = 12;
pub const MATHEMATICS: i64 = 1;
pub const STUDENT: i64 = 1000;

/// Demo backend where every call takes `latency`.
pub fn demo_backend(latency: Duration) -> Arc<InMemorySchoolApi> {
    Arc::new(InMemorySchoolApi::with_demo_data().with_latency(latency))
}

/// A context on a private bus with auto-refresh off.
pub fn event_only_context(api: Arc<InMemorySchoolApi>) -> StoreContext {
    StoreContext::new(
        api,
        EventBus::new(),
        RefreshConfig::new(Duration::from_secs(60), false),
    )
}

/// Records every event kind delivered on `bus`, in delivery order.
pub struct EventLog {
    kinds: Arc<Mutex<Vec<EventKind>>>,
    _subscriptions: Vec<Subscription>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = {
            let kinds = kinds.clone();
            bus.subscribe_many(EventKind::all(), move |event| {
                kinds.lock().unwrap().push(event.kind());
            })
        };
        Self {
            kinds,
            _subscriptions: subscriptions,
        }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.kinds.lock().unwrap().clone()
    }
}

/// Poll `condition` until it holds, failing the test after about two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
