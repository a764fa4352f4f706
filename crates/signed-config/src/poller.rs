//! Fixed-interval poller.
//!
//! The poller runs its action once synchronously, then hands it to a
//! [`Scheduler`] for repeated execution. Timer registration is the
//! scheduler's concern, so hosts with their own event loop can plug theirs in.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::error::{ConfigError, ConfigResult};

/// Minimum poll interval; shorter requests are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Action invoked on every tick.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Handle identifying one repeating schedule.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CancelHandle(u64);

impl CancelHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Timer capability used by [`Poller`].
pub trait Scheduler: Send + Sync {
    /// Run `action` every `delay`, first after one full `delay`.
    fn schedule_repeating(&self, delay: Duration, action: Action) -> CancelHandle;

    /// Stop future runs of the schedule. Unknown handles are ignored.
    fn cancel(&self, handle: CancelHandle);
}

/// Scheduler backed by tokio timers.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a scheduler on the current tokio runtime.
    pub fn from_current() -> ConfigResult<Self> {
        let runtime = Handle::try_current().map_err(|e| ConfigError::Config {
            message: format!("no tokio runtime available for polling: {}", e),
        })?;
        Ok(Self::new(runtime))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, delay: Duration, action: Action) -> CancelHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let task = self.runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + delay, delay);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                run_action(&action);
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(id, task);
        }
        CancelHandle(id)
    }

    fn cancel(&self, handle: CancelHandle) {
        let task = self.tasks.lock().ok().and_then(|mut t| t.remove(&handle.0));
        if let Some(task) = task {
            task.abort();
            debug!(schedule = handle.0, "cancelled schedule");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}

/// Run an action, containing a panic to this single invocation.
fn run_action(action: &Action) {
    if catch_unwind(AssertUnwindSafe(|| action())).is_err() {
        error!("poll action panicked; schedule continues");
    }
}

/// Runs an action immediately and then at a fixed interval.
pub struct Poller {
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    handle: Mutex<Option<CancelHandle>>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("delay", &self.delay)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Poller {
    /// Create a poller; `delay` is clamped to [`MIN_POLL_INTERVAL`].
    pub fn new(delay: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        if delay < MIN_POLL_INTERVAL {
            debug!(
                requested_secs = delay.as_secs(),
                min_secs = MIN_POLL_INTERVAL.as_secs(),
                "poll interval raised to minimum"
            );
        }
        Self {
            delay: delay.max(MIN_POLL_INTERVAL),
            scheduler,
            handle: Mutex::new(None),
        }
    }

    /// Effective poll interval.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` now, then every [`delay`](Self::delay) until stopped.
    ///
    /// Starting a running poller replaces its schedule.
    pub fn start<F>(&self, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let action: Action = Arc::new(action);
        run_action(&action);

        let handle = self.scheduler.schedule_repeating(self.delay, action);
        let previous = self.handle.lock().ok().and_then(|mut h| h.replace(handle));
        if let Some(previous) = previous {
            self.scheduler.cancel(previous);
        }
    }

    /// Cancel future ticks. In-flight work started by a tick is unaffected.
    pub fn stop(&self) {
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            self.scheduler.cancel(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
