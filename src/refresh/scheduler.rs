use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::bus::panic_message;

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

pub type RefreshFuture = BoxFuture<'static, Result<(), String>>;

/// The refresh operation a task invokes on every tick.
pub type RefreshFn = Arc<dyn Fn() -> RefreshFuture + Send + Sync>;

/// Adapt an async closure into a [`RefreshFn`].
pub fn refresh_fn<F, Fut, E>(f: F) -> RefreshFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display,
{
    Arc::new(move || {
        let fut = f();
        async move { fut.await.map_err(|error| error.to_string()) }.boxed()
    })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("refresh interval must be greater than 0")]
    InvalidInterval,
    #[error("refresh task requires a running tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

fn default_enabled() -> bool {
    true
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            enabled: true,
        }
    }
}

impl RefreshConfig {
    pub fn new(interval: Duration, enabled: bool) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            enabled,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), RefreshError> {
        if self.interval_ms == 0 {
            return Err(RefreshError::InvalidInterval);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Disabled,
    Idle,
    Refreshing,
}

struct TaskShared {
    name: String,
    busy: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Holds the busy flag for one refresh and clears it on every exit path.
struct BusyGuard {
    shared: Arc<TaskShared>,
}

impl BusyGuard {
    fn try_acquire(shared: &Arc<TaskShared>) -> Option<Self> {
        if shared.busy.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self {
            shared: shared.clone(),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.shared.busy.store(false, Ordering::Release);
    }
}

struct Controls {
    config: RefreshConfig,
    on_refresh: RefreshFn,
    timer: Option<JoinHandle<()>>,
}

/// Periodic refresh bound to one owner.
///
/// States are `Disabled`, `Idle` and `Refreshing`. A tick that lands while a
/// refresh is still running is dropped, never queued. Any change to the
/// interval, callback or enabled flag replaces the timer, and dropping the
/// task cancels it.
pub struct RefreshTask {
    shared: Arc<TaskShared>,
    controls: Mutex<Controls>,
    runtime: Handle,
}

impl RefreshTask {
    pub fn new(
        name: impl Into<String>,
        config: RefreshConfig,
        on_refresh: RefreshFn,
    ) -> Result<Self, RefreshError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| RefreshError::NoRuntime)?;

        let task = Self {
            shared: Arc::new(TaskShared {
                name: name.into(),
                busy: AtomicBool::new(false),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            controls: Mutex::new(Controls {
                config,
                on_refresh,
                timer: None,
            }),
            runtime,
        };
        {
            let mut controls = task.lock();
            task.restart(&mut controls);
        }
        Ok(task)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> RefreshConfig {
        self.lock().config
    }

    pub fn status(&self) -> RefreshStatus {
        let enabled = self.lock().config.enabled;
        if !enabled {
            RefreshStatus::Disabled
        } else if self.shared.busy.load(Ordering::Acquire) {
            RefreshStatus::Refreshing
        } else {
            RefreshStatus::Idle
        }
    }

    /// Refreshes that finished successfully.
    pub fn completed_refreshes(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Refreshes that returned an error or panicked.
    pub fn failed_refreshes(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Ticks dropped because a refresh was still in flight.
    pub fn skipped_ticks(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut controls = self.lock();
        if controls.config.enabled == enabled {
            return;
        }
        controls.config.enabled = enabled;
        self.restart(&mut controls);
    }

    pub fn set_interval(&self, interval: Duration) -> Result<(), RefreshError> {
        let candidate = RefreshConfig::new(interval, true);
        candidate.validate()?;

        let mut controls = self.lock();
        if controls.config.interval_ms == candidate.interval_ms {
            return Ok(());
        }
        controls.config.interval_ms = candidate.interval_ms;
        self.restart(&mut controls);
        Ok(())
    }

    pub fn set_on_refresh(&self, on_refresh: RefreshFn) {
        let mut controls = self.lock();
        controls.on_refresh = on_refresh;
        self.restart(&mut controls);
    }

    /// Replace every parameter at once and start over with a fresh timer.
    pub fn reconfigure(
        &self,
        config: RefreshConfig,
        on_refresh: RefreshFn,
    ) -> Result<(), RefreshError> {
        config.validate()?;
        let mut controls = self.lock();
        controls.config = config;
        controls.on_refresh = on_refresh;
        self.restart(&mut controls);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Controls> {
        self.controls.lock().expect("refresh task mutex poisoned")
    }

    fn restart(&self, controls: &mut Controls) {
        if let Some(timer) = controls.timer.take() {
            timer.abort();
        }
        if !controls.config.enabled {
            tracing::debug!(task = %self.shared.name, "auto-refresh disabled");
            return;
        }

        let interval = controls.config.interval();
        tracing::debug!(
            task = %self.shared.name,
            interval_ms = controls.config.interval_ms,
            "auto-refresh timer started"
        );
        controls.timer = Some(self.runtime.spawn(run_timer(
            self.shared.clone(),
            interval,
            controls.on_refresh.clone(),
        )));
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        let timer = match self.controls.get_mut() {
            Ok(controls) => controls.timer.take(),
            Err(poisoned) => poisoned.into_inner().timer.take(),
        };
        if let Some(timer) = timer {
            timer.abort();
            tracing::debug!(task = %self.shared.name, "auto-refresh timer stopped");
        }
    }
}

async fn run_timer(shared: Arc<TaskShared>, period: Duration, on_refresh: RefreshFn) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(guard) = BusyGuard::try_acquire(&shared) else {
            shared.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(task = %shared.name, "previous refresh still running, tick skipped");
            continue;
        };

        let on_refresh = on_refresh.clone();
        tokio::spawn(async move {
            let shared = guard.shared.clone();
            let outcome = std::panic::AssertUnwindSafe(async move { on_refresh().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    shared.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(error)) => {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(task = %shared.name, "scheduled refresh failed: {error}");
                }
                Err(panic) => {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        task = %shared.name,
                        "scheduled refresh panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
            drop(guard);
        });
    }
}
