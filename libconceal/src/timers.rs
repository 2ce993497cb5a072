//! Owned-timer capability
//!
//! The store never touches a clock directly. Recurring work requested via
//! `SET_INTERVALS` is handed to a [`TimerDriver`], and every handle the
//! driver runs is listed in the state document until `CLEAR_APP` cancels it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Result, TimerError};

/// Identifier of a timer owned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalHandle(u64);

impl IntervalHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for IntervalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interval#{}", self.0)
    }
}

/// Callback run on every timer period
pub type Tick = Arc<dyn Fn() + Send + Sync>;

/// Schedules and cancels recurring callbacks on behalf of the store
pub trait TimerDriver: Send + Sync {
    /// Run `tick` every `every`, first after one full period
    ///
    /// Starting a handle that is already running replaces it.
    fn start(&self, handle: IntervalHandle, every: Duration, tick: Tick) -> Result<()>;

    /// Stop a timer. Unknown or already cancelled handles are ignored.
    ///
    /// No new tick starts once this returns. A tick already running on
    /// another thread may still be finishing; the store waits those out.
    fn cancel(&self, handle: IntervalHandle);

    /// Number of timers currently running
    fn active(&self) -> usize;
}

struct TimerTask {
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TimerTask {
    fn stop(self) {
        self.cancelled.store(true, Ordering::Release);
        self.join.abort();
    }
}

/// Timer driver backed by Tokio tasks
pub struct TokioTimers {
    runtime: tokio::runtime::Handle,
    tasks: Mutex<BTreeMap<IntervalHandle, TimerTask>>,
}

impl TokioTimers {
    /// Create a driver on the runtime of the calling context
    pub fn from_current() -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    /// Create a driver that spawns onto the given runtime
    pub fn with_runtime(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(BTreeMap::new()),
        }
    }
}

impl TimerDriver for TokioTimers {
    fn start(&self, handle: IntervalHandle, every: Duration, tick: Tick) -> Result<()> {
        if every.is_zero() {
            return Err(TimerError::ZeroPeriod.into());
        }

        let first = Instant::now()
            .checked_add(every)
            .ok_or(TimerError::PeriodTooLong(every))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                tick();
            }
        });

        let previous = self
            .tasks
            .lock()
            .insert(handle, TimerTask { cancelled, join });
        if let Some(previous) = previous {
            tracing::warn!(%handle, "timer restarted, stopping previous task");
            previous.stop();
        }

        tracing::debug!(%handle, every_secs = every.as_secs_f64(), "timer started");
        Ok(())
    }

    fn cancel(&self, handle: IntervalHandle) {
        if let Some(task) = self.tasks.lock().remove(&handle) {
            task.stop();
            tracing::debug!(%handle, "timer cancelled");
        }
    }

    fn active(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for (_, task) in tasks {
            task.stop();
        }
    }
}

/// Deterministic timer driver that only fires when told to
///
/// Useful in tests and in hosts that drive periodic work from their own
/// scheduler.
#[derive(Default)]
pub struct ManualTimers {
    timers: Mutex<BTreeMap<IntervalHandle, (Duration, Tick)>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one timer. Returns false if the handle is not running.
    pub fn fire(&self, handle: IntervalHandle) -> bool {
        let tick = self.timers.lock().get(&handle).map(|(_, tick)| Arc::clone(tick));
        match tick {
            Some(tick) => {
                tick();
                true
            }
            None => false,
        }
    }

    /// Fire every running timer once, returning how many fired
    pub fn fire_all(&self) -> usize {
        let handles: Vec<IntervalHandle> = self.timers.lock().keys().copied().collect();
        handles.into_iter().filter(|handle| self.fire(*handle)).count()
    }

    pub fn is_running(&self, handle: IntervalHandle) -> bool {
        self.timers.lock().contains_key(&handle)
    }

    /// Period a running timer was started with
    pub fn period(&self, handle: IntervalHandle) -> Option<Duration> {
        self.timers.lock().get(&handle).map(|(every, _)| *every)
    }
}

impl TimerDriver for ManualTimers {
    fn start(&self, handle: IntervalHandle, every: Duration, tick: Tick) -> Result<()> {
        if every.is_zero() {
            return Err(TimerError::ZeroPeriod.into());
        }
        self.timers.lock().insert(handle, (every, tick));
        Ok(())
    }

    fn cancel(&self, handle: IntervalHandle) {
        self.timers.lock().remove(&handle);
    }

    fn active(&self) -> usize {
        self.timers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Tick) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let tick: Tick = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, tick)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_each_period() {
        let timers = TokioTimers::from_current().unwrap();
        let (count, tick) = counter();

        timers
            .start(IntervalHandle::new(1), Duration::from_secs(10), tick)
            .unwrap();

        // Let the spawned task register its first deadline
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "first tick waits a full period");

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_stops_after_cancel() {
        let timers = TokioTimers::from_current().unwrap();
        let (count, tick) = counter();
        let handle = IntervalHandle::new(7);

        timers.start(handle, Duration::from_secs(1), tick).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let before = count.load(Ordering::SeqCst);
        assert_eq!(before, 2);

        timers.cancel(handle);
        timers.cancel(handle);
        assert_eq!(timers.active(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let timers = TokioTimers::from_current().unwrap();
        let (_, tick) = counter();
        let result = timers.start(IntervalHandle::new(1), Duration::ZERO, tick);
        assert!(result.is_err());
        assert_eq!(timers.active(), 0);
    }

    #[tokio::test]
    async fn test_unschedulable_period_is_rejected() {
        let timers = TokioTimers::from_current().unwrap();
        let (count, tick) = counter();
        let result = timers.start(IntervalHandle::new(2), Duration::MAX, tick);

        assert!(matches!(
            result,
            Err(crate::ConcealError::Timer(TimerError::PeriodTooLong(_)))
        ));
        assert_eq!(timers.active(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_current_outside_runtime() {
        let result = TokioTimers::from_current();
        assert!(matches!(
            result,
            Err(crate::ConcealError::Timer(TimerError::NoRuntime))
        ));
    }

    #[test]
    fn test_manual_timers_fire_until_cancelled() {
        let timers = ManualTimers::new();
        let (count, tick) = counter();
        let handle = IntervalHandle::new(3);

        timers.start(handle, Duration::from_secs(10), tick).unwrap();
        assert_eq!(timers.period(handle), Some(Duration::from_secs(10)));
        assert_eq!(timers.fire_all(), 1);
        assert!(timers.fire(handle));

        timers.cancel(handle);
        assert!(!timers.fire(handle));
        assert_eq!(timers.fire_all(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(IntervalHandle::new(12).to_string(), "interval#12");
    }
}
