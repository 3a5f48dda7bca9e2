use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use crate::api::{ApiError, SchoolApi};
use crate::bus::{AppEvent, BusEvent, EventBus, EventKind, Subscription};
use crate::refresh::{refresh_fn, RefreshConfig, RefreshError, RefreshStatus, RefreshTask};

/// Where a store's data comes from and which events make it stale.
#[async_trait]
pub trait SliceSource: Send + Sync + 'static {
    type Data: Clone + Default + Send + Sync + 'static;

    /// Short name used in logs and refresh task names.
    const NAME: &'static str;

    /// Events after which the server-side data behind this slice may have
    /// changed.
    fn stale_on(&self) -> &'static [EventKind];

    async fn load(&self, api: &dyn SchoolApi) -> Result<Self::Data, ApiError>;
}

/// What a store exposes to the view rendering it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SliceSnapshot<T> {
    pub data: T,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Collaborators every store is mounted with.
#[derive(Clone)]
pub struct StoreContext {
    pub api: Arc<dyn SchoolApi>,
    pub bus: EventBus,
    pub refresh: RefreshConfig,
}

impl StoreContext {
    pub fn new(api: Arc<dyn SchoolApi>, bus: EventBus, refresh: RefreshConfig) -> Self {
        Self { api, bus, refresh }
    }
}

struct SliceCore<S: SliceSource> {
    id: Uuid,
    source: S,
    api: Arc<dyn SchoolApi>,
    state: watch::Sender<SliceSnapshot<S::Data>>,
    in_flight: AtomicUsize,
    fetches: AtomicU64,
    mounted: AtomicBool,
}

impl<S: SliceSource> SliceCore<S> {
    /// Load the whole slice and replace local state with the result. A
    /// failure keeps the previous data and records the error. Results that
    /// arrive after unmount are dropped.
    async fn fetch_all(&self) -> Result<(), ApiError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.state.send_modify(|snapshot| {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            snapshot.is_loading = true;
        });
        tracing::debug!(store = S::NAME, instance = %self.id, "fetch started");

        let result = self.source.load(self.api.as_ref()).await;

        if !self.mounted.load(Ordering::Acquire) {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(store = S::NAME, instance = %self.id, "store unmounted, fetch result discarded");
            return result.map(|_| ());
        }

        // The counter only changes under the channel's write lock, so the
        // last fetch to land always writes `is_loading = false`.
        match result {
            Ok(data) => {
                self.state.send_modify(|snapshot| {
                    snapshot.data = data;
                    snapshot.error = None;
                    snapshot.is_loading = self.finish_fetch();
                    snapshot.last_fetched_at = Some(Utc::now());
                });
                tracing::debug!(store = S::NAME, instance = %self.id, "fetch finished");
                Ok(())
            }
            Err(error) => {
                let message = error.to_string();
                self.state.send_modify(|snapshot| {
                    snapshot.error = Some(message);
                    snapshot.is_loading = self.finish_fetch();
                });
                Err(error)
            }
        }
    }

    /// Retire one in-flight fetch; true while others are still running.
    fn finish_fetch(&self) -> bool {
        self.in_flight.fetch_sub(1, Ordering::AcqRel) > 1
    }

    fn on_stale_event(self: Arc<Self>, event: &BusEvent, runtime: &Handle) {
        if event.origin == Some(self.id) {
            tracing::trace!(store = S::NAME, event = %event.kind(), "ignoring own event");
            return;
        }
        tracing::debug!(
            store = S::NAME,
            instance = %self.id,
            event = %event.kind(),
            seq = event.seq,
            "stale event received, refetching"
        );
        runtime.spawn(async move {
            if let Err(error) = self.fetch_all().await {
                tracing::warn!(store = S::NAME, "event-triggered fetch failed: {error}");
            }
        });
    }
}

/// One mounted store: a slice of server data kept fresh by bus events and a
/// fallback auto-refresh task.
///
/// Dropping the slice unmounts it: subscriptions are released, the refresh
/// timer stops and fetches still in flight are discarded when they land.
pub struct LiveSlice<S: SliceSource> {
    core: Arc<SliceCore<S>>,
    bus: EventBus,
    refresh: RefreshTask,
    subscriptions: Vec<Subscription>,
}

impl<S: SliceSource> LiveSlice<S> {
    /// Subscribe, start auto-refresh and perform the initial fetch.
    pub async fn mount(source: S, ctx: &StoreContext) -> Result<Self, RefreshError> {
        let (state, _) = watch::channel(SliceSnapshot::default());
        let core = Arc::new(SliceCore {
            id: Uuid::new_v4(),
            source,
            api: ctx.api.clone(),
            state,
            in_flight: AtomicUsize::new(0),
            fetches: AtomicU64::new(0),
            mounted: AtomicBool::new(true),
        });

        let on_refresh = {
            let weak = Arc::downgrade(&core);
            refresh_fn(move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(core) => core.fetch_all().await,
                        None => Ok(()),
                    }
                }
            })
        };
        let refresh = RefreshTask::new(
            format!("{}:{}", S::NAME, core.id),
            ctx.refresh,
            on_refresh,
        )?;

        let subscriptions = {
            let weak = Arc::downgrade(&core);
            let runtime = Handle::current();
            ctx.bus.subscribe_many(core.source.stale_on(), move |event| {
                if let Some(core) = weak.upgrade() {
                    core.on_stale_event(event, &runtime);
                }
            })
        };

        tracing::debug!(store = S::NAME, instance = %core.id, "store mounted");
        let slice = Self {
            core,
            bus: ctx.bus.clone(),
            refresh,
            subscriptions,
        };
        slice.refetch().await;
        Ok(slice)
    }

    /// Fetch now, outside the auto-refresh guard. Errors end up in the
    /// snapshot, never in the return value.
    pub async fn refetch(&self) -> SliceSnapshot<S::Data> {
        if let Err(error) = self.core.fetch_all().await {
            tracing::warn!(store = S::NAME, "fetch failed, keeping previous data: {error}");
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> SliceSnapshot<S::Data> {
        self.core.state.borrow().clone()
    }

    /// Borrow the current data without cloning it.
    pub fn with_data<R>(&self, f: impl FnOnce(&S::Data) -> R) -> R {
        f(&self.core.state.borrow().data)
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SliceSnapshot<S::Data>> {
        self.core.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.core.state.borrow().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.core.state.borrow().error.clone()
    }

    pub fn instance_id(&self) -> Uuid {
        self.core.id
    }

    pub fn name(&self) -> &'static str {
        S::NAME
    }

    /// Number of fetches started by this instance, from any path.
    pub fn fetch_count(&self) -> u64 {
        self.core.fetches.load(Ordering::Relaxed)
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        self.refresh.status()
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.refresh.set_enabled(enabled);
    }

    pub fn set_refresh_interval(&self, interval: Duration) -> Result<(), RefreshError> {
        self.refresh.set_interval(interval)
    }

    pub fn subscribed_events(&self) -> Vec<EventKind> {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.is_active())
            .map(|subscription| subscription.kind())
            .collect()
    }

    pub(crate) fn api(&self) -> &dyn SchoolApi {
        self.core.api.as_ref()
    }

    /// Apply a server-confirmed change to the local data.
    pub(crate) fn patch(&self, f: impl FnOnce(&mut S::Data)) {
        self.core.state.send_modify(|snapshot| f(&mut snapshot.data));
    }

    /// Announce a change made by this instance. The instance itself skips
    /// the event; every other subscriber refetches.
    pub(crate) fn emit(&self, event: AppEvent) -> BusEvent {
        self.bus.emit_from(self.core.id, event)
    }

    pub fn unmount(self) {
        drop(self);
    }
}

impl<S: SliceSource> Drop for LiveSlice<S> {
    fn drop(&mut self) {
        self.core.mounted.store(false, Ordering::Release);
        tracing::debug!(store = S::NAME, instance = %self.core.id, "store unmounted");
    }
}

/// Records addressed by a numeric id inside a slice.
pub(crate) trait Keyed {
    fn key(&self) -> i64;
}

/// Replace the record with the same key, or append it.
pub(crate) fn upsert<T: Keyed>(items: &mut Vec<T>, item: T) {
    match items.iter_mut().find(|existing| existing.key() == item.key()) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

pub(crate) fn remove_by_key<T: Keyed>(items: &mut Vec<T>, key: i64) {
    items.retain(|existing| existing.key() != key);
}

impl Keyed for crate::api::EnrollmentRequest {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for crate::api::EnrolledSubject {
    fn key(&self) -> i64 {
        self.subject_id
    }
}

impl Keyed for crate::api::CourseRequest {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for crate::api::Course {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for crate::api::Grade {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for crate::api::Feedback {
    fn key(&self) -> i64 {
        self.id
    }
}
