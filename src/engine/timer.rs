//! Clocks and one-shot timers behind the confirmation gate.
//!
//! The gate never sleeps. It asks a [`TimerScheduler`] to run a task after the
//! confirmation delay and reads "now" from a [`TimeSource`]. Production uses
//! [`SystemTimeSource`] with [`TokioTimer`]; tests and offline replay use
//! [`SimulatedClock`], which implements both traits over a virtual timeline.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::AudioError;

/// Trait representing a monotonic time source used for cooldown checks.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time source that follows tokio's clock, so paused test runtimes control it.
#[derive(Default)]
pub struct TokioClock {
    _unit: (),
}

impl TimeSource for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Work run when a timer elapses
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled one-shot timer
pub trait ScheduledTimer: Send {
    /// Prevent the task from running if it has not started yet
    fn cancel(&self);
}

/// Schedules one-shot tasks after a delay
pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn ScheduledTimer>;
}

/// Timer scheduler spawning sleeping tasks on a tokio runtime
#[derive(Clone)]
pub struct TokioTimer {
    handle: Handle,
}

impl TokioTimer {
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is currently inside
    pub fn current() -> Result<Self, AudioError> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|err| AudioError::TimerUnavailable {
                reason: err.to_string(),
            })
    }
}

struct TokioScheduled(JoinHandle<()>);

impl ScheduledTimer for TokioScheduled {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl TimerScheduler for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn ScheduledTimer> {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioScheduled(join))
    }
}

/// Dedicated single-worker runtime for confirmation timers
///
/// Owned by the detector so the runtime is never dropped from inside one of
/// its own tasks. Shuts down without waiting for pending timers.
pub struct TimerRuntime {
    runtime: Option<Runtime>,
}

impl TimerRuntime {
    pub fn new() -> Result<Self, AudioError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("clap-confirm-timer")
            .enable_time()
            .build()
            .map_err(|err| AudioError::TimerUnavailable {
                reason: err.to_string(),
            })?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    pub fn timer(&self) -> Option<TokioTimer> {
        self.runtime
            .as_ref()
            .map(|runtime| TokioTimer::with_handle(runtime.handle().clone()))
    }
}

impl Drop for TimerRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

struct SimulatedTimer {
    id: u64,
    deadline: Duration,
    task: TimerTask,
}

#[derive(Default)]
struct SimulatedState {
    elapsed: Duration,
    next_id: u64,
    pending: Vec<SimulatedTimer>,
}

/// Deterministic virtual clock and timer queue
///
/// Time only moves when [`SimulatedClock::advance`] is called; due timers run
/// on the calling thread in deadline order, each seeing `now()` equal to its
/// own deadline.
pub struct SimulatedClock {
    origin: Instant,
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Number of timers scheduled and not yet run or cancelled
    pub fn pending_timers(&self) -> usize {
        self.lock().pending.len()
    }

    /// Move virtual time forward, running every timer that falls due
    pub fn advance(&self, by: Duration) {
        let target = self.lock().elapsed + by;
        loop {
            let task = {
                let mut state = self.lock();
                let due = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.deadline <= target)
                    .min_by_key(|(_, timer)| (timer.deadline, timer.id))
                    .map(|(index, _)| index);

                match due {
                    Some(index) => {
                        let timer = state.pending.swap_remove(index);
                        state.elapsed = state.elapsed.max(timer.deadline);
                        Some(timer.task)
                    }
                    None => {
                        state.elapsed = target;
                        None
                    }
                }
            };

            // Run outside the lock: tasks may schedule new timers
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SimulatedClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

struct SimulatedHandle {
    id: u64,
    state: Weak<Mutex<SimulatedState>>,
}

impl ScheduledTimer for SimulatedHandle {
    fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.pending.retain(|timer| timer.id != self.id);
        }
    }
}

impl TimerScheduler for SimulatedClock {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn ScheduledTimer> {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.elapsed + delay;
        state.pending.push(SimulatedTimer { id, deadline, task });
        Box::new(SimulatedHandle {
            id,
            state: Arc::downgrade(&self.state),
        })
    }
}
