// ConfirmationGate - debounce and cooldown for strong clap onsets
//
// A strong onset arms a confirmation timer. If another strong onset arrives
// before it fires, the timer is cancelled and restarted, so a burst of
// frames from one clap (or a run of noise) confirms at most once, after the
// burst ends. A confirmed clap starts a cooldown window during which strong
// onsets are ignored.
//
// State transitions (all taken under one lock):
//
//   Idle       + Strong, cooling  -> Idle          (ignored)
//   Idle       + Strong           -> Confirming    (timer armed)
//   Confirming + Strong, cooling  -> Idle          (timer cancelled, ignored)
//   Confirming + Strong           -> Confirming    (timer restarted)
//   Confirming + timer fires      -> Idle          (clap confirmed, cooldown starts)
//   any        + cancel           -> Idle
//
// Every armed timer carries a generation number. A timer that fires after it
// was superseded or cancelled finds a different generation (or none) pending
// and does nothing, so a late-running task can never confirm twice.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::events::{ClapEvent, EventSink};
use super::timer::{ScheduledTimer, TimeSource, TimerScheduler};
use crate::config::{read_config, SharedConfig};
use crate::telemetry::TelemetryCollector;

/// Outcome of feeding a strong onset to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No confirmation was pending; a timer was armed
    Armed,
    /// A pending confirmation was cancelled and a new timer armed
    Rearmed,
    /// Inside the cooldown window; nothing armed
    Ignored {
        remaining: Duration,
        /// A pending confirmation was cancelled as well
        cancelled_pending: bool,
    },
}

struct PendingConfirmation {
    generation: u64,
    timer: Box<dyn ScheduledTimer>,
}

#[derive(Default)]
struct TimingState {
    /// When the last clap was confirmed; `None` before the first one
    last_action: Option<Instant>,
    pending: Option<PendingConfirmation>,
    generation: u64,
}

impl TimingState {
    fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_action?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn take_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.timer.cancel();
                true
            }
            None => false,
        }
    }
}

/// Lock-guarded debounce/cooldown state machine
pub struct ConfirmationGate {
    state: Mutex<TimingState>,
    config: SharedConfig,
    clock: Arc<dyn TimeSource>,
    scheduler: Arc<dyn TimerScheduler>,
    sink: Arc<dyn EventSink>,
    telemetry: Arc<TelemetryCollector>,
}

impl ConfirmationGate {
    pub fn new(
        config: SharedConfig,
        clock: Arc<dyn TimeSource>,
        scheduler: Arc<dyn TimerScheduler>,
        sink: Arc<dyn EventSink>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TimingState::default()),
            config,
            clock,
            scheduler,
            sink,
            telemetry,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TimingState> {
        // Timing state stays consistent across a panic: every field is
        // replaced wholesale
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed one strong onset
    pub fn on_strong(self: &Arc<Self>) -> GateDecision {
        let debounce = read_config(&self.config).debounce.clone();
        let delay = debounce.confirmation_delay();

        let mut state = self.lock_state();
        let now = self.clock.now();

        if let Some(remaining) = state.cooldown_remaining(now, debounce.cooldown()) {
            let cancelled_pending = state.take_pending();
            drop(state);

            debug!(
                "[ConfirmationGate] Strong onset ignored, cooldown {}ms remaining",
                remaining.as_millis()
            );
            self.telemetry.record_ignored(remaining, cancelled_pending);
            return GateDecision::Ignored {
                remaining,
                cancelled_pending,
            };
        }

        let restarted = state.take_pending();
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        // Scheduling under the lock: a zero-delay timer may run at once on
        // another thread, and must find its generation already pending
        let gate: Weak<Self> = Arc::downgrade(self);
        let timer = self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(gate) = gate.upgrade() {
                    gate.fire(generation);
                }
            }),
        );
        state.pending = Some(PendingConfirmation { generation, timer });
        drop(state);

        debug!(
            "[ConfirmationGate] Confirmation {} ({}ms, generation {})",
            if restarted { "restarted" } else { "armed" },
            delay.as_millis(),
            generation
        );
        self.telemetry.record_armed(restarted, delay);

        if restarted {
            GateDecision::Rearmed
        } else {
            GateDecision::Armed
        }
    }

    fn fire(&self, generation: u64) {
        let mut state = self.lock_state();
        let current = state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation);
        if !current {
            debug!(
                "[ConfirmationGate] Stale confirmation timer (generation {}) ignored",
                generation
            );
            return;
        }

        state.pending = None;
        state.last_action = Some(self.clock.now());
        drop(state);

        info!("[ConfirmationGate] Clap confirmed");
        self.telemetry.record_confirmed();
        // Emitted outside the lock so the sink may call back into the detector
        self.sink.emit(ClapEvent::Confirmed);
    }

    /// Cancel any pending confirmation; returns whether one was pending
    pub fn cancel_pending(&self) -> bool {
        let cancelled = self.lock_state().take_pending();
        if cancelled {
            debug!("[ConfirmationGate] Pending confirmation cancelled");
            self.telemetry.record_cancelled();
        }
        cancelled
    }

    pub fn is_confirming(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    /// Time of the most recent confirmed clap
    pub fn last_action(&self) -> Option<Instant> {
        self.lock_state().last_action
    }

    /// Remaining cooldown at the current time, if any
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let cooldown = read_config(&self.config).debounce.cooldown();
        let state = self.lock_state();
        state.cooldown_remaining(self.clock.now(), cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{shared, DetectorConfig, write_config};
    use crate::engine::timer::SimulatedClock;
    use tokio::sync::mpsc;

    struct Fixture {
        clock: Arc<SimulatedClock>,
        gate: Arc<ConfirmationGate>,
        events: mpsc::UnboundedReceiver<ClapEvent>,
        config: SharedConfig,
        telemetry: Arc<TelemetryCollector>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(SimulatedClock::new());
            let config = shared(DetectorConfig::default());
            let (tx, events) = mpsc::unbounded_channel();
            let telemetry = Arc::new(TelemetryCollector::default());
            let gate = ConfirmationGate::new(
                Arc::clone(&config),
                clock.clone(),
                clock.clone(),
                Arc::new(tx),
                Arc::clone(&telemetry),
            );
            Self {
                clock,
                gate,
                events,
                config,
                telemetry,
            }
        }

        fn advance_ms(&self, ms: u64) {
            self.clock.advance(Duration::from_millis(ms));
        }

        fn drain(&mut self) -> Vec<ClapEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    #[test]
    fn single_strong_onset_confirms_after_delay() {
        let mut fx = Fixture::new();
        assert_eq!(fx.gate.on_strong(), GateDecision::Armed);
        assert!(fx.gate.is_confirming());

        fx.advance_ms(299);
        assert!(fx.drain().is_empty());

        fx.advance_ms(1);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed]);
        assert!(!fx.gate.is_confirming());
        assert_eq!(
            fx.gate.last_action().map(|at| at - fx.clock.now()),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn repeated_onsets_restart_the_window() {
        let mut fx = Fixture::new();
        assert_eq!(fx.gate.on_strong(), GateDecision::Armed);
        fx.advance_ms(200);
        assert_eq!(fx.gate.on_strong(), GateDecision::Rearmed);
        fx.advance_ms(200);
        assert_eq!(fx.gate.on_strong(), GateDecision::Rearmed);

        // 600ms after the first onset, only 200ms after the last
        fx.advance_ms(200);
        assert!(fx.drain().is_empty());

        fx.advance_ms(100);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed]);
        assert_eq!(fx.clock.pending_timers(), 0);
    }

    #[test]
    fn cooldown_ignores_strong_onsets() {
        let mut fx = Fixture::new();
        fx.gate.on_strong();
        fx.advance_ms(300);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed]);

        fx.advance_ms(1000);
        match fx.gate.on_strong() {
            GateDecision::Ignored {
                remaining,
                cancelled_pending,
            } => {
                assert_eq!(remaining, Duration::from_millis(500));
                assert!(!cancelled_pending);
            }
            other => panic!("expected ignored, got {:?}", other),
        }
        assert!(!fx.gate.is_confirming());

        fx.advance_ms(1000);
        assert!(fx.drain().is_empty());
    }

    #[test]
    fn onset_after_cooldown_arms_again() {
        let mut fx = Fixture::new();
        fx.gate.on_strong();
        fx.advance_ms(300);
        fx.advance_ms(1500);

        assert_eq!(fx.gate.cooldown_remaining(), None);
        assert_eq!(fx.gate.on_strong(), GateDecision::Armed);
        fx.advance_ms(300);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed, ClapEvent::Confirmed]);
    }

    #[test]
    fn cooldown_during_confirmation_cancels_pending() {
        let mut fx = Fixture::new();
        fx.gate.on_strong();
        fx.advance_ms(300);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed]);

        // Shorten the cooldown so a confirmation can be armed, then lengthen it
        write_config(&fx.config).debounce.cooldown_ms = 100;
        fx.advance_ms(200);
        assert_eq!(fx.gate.on_strong(), GateDecision::Armed);

        write_config(&fx.config).debounce.cooldown_ms = 5000;
        assert!(matches!(
            fx.gate.on_strong(),
            GateDecision::Ignored {
                cancelled_pending: true,
                ..
            }
        ));
        assert!(!fx.gate.is_confirming());

        fx.advance_ms(1000);
        assert!(fx.drain().is_empty());
    }

    #[test]
    fn cancel_pending_prevents_confirmation() {
        let mut fx = Fixture::new();
        fx.gate.on_strong();
        assert!(fx.gate.cancel_pending());
        assert!(!fx.gate.cancel_pending());

        fx.advance_ms(1000);
        assert!(fx.drain().is_empty());
        assert_eq!(fx.gate.last_action(), None);
    }

    #[test]
    fn stale_generation_is_a_no_op() {
        let mut fx = Fixture::new();
        fx.gate.on_strong();
        // Simulate a superseded timer that was already running
        fx.gate.fire(0);
        assert!(fx.gate.is_confirming());
        assert!(fx.drain().is_empty());

        fx.advance_ms(300);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed]);
        fx.gate.fire(1);
        assert!(fx.drain().is_empty());
    }

    #[test]
    fn zero_delay_confirms_on_next_advance() {
        let mut fx = Fixture::new();
        write_config(&fx.config).debounce.confirmation_delay_ms = 0;
        fx.gate.on_strong();
        fx.advance_ms(0);
        assert_eq!(fx.drain(), vec![ClapEvent::Confirmed]);
    }

    #[test]
    fn transitions_are_recorded_in_telemetry() {
        let fx = Fixture::new();
        fx.gate.on_strong();
        fx.gate.on_strong();
        fx.advance_ms(300);
        fx.gate.on_strong();

        let snapshot = fx.telemetry.snapshot();
        use crate::telemetry::MetricEvent;
        assert_eq!(
            snapshot.count(|e| matches!(e, MetricEvent::ConfirmationArmed { .. })),
            2
        );
        assert_eq!(
            snapshot.count(|e| matches!(e, MetricEvent::ClapConfirmed { .. })),
            1
        );
        assert_eq!(
            snapshot.count(|e| matches!(e, MetricEvent::ClapIgnored { .. })),
            1
        );
    }

    #[test]
    fn sink_may_reenter_the_gate() {
        let clock = Arc::new(SimulatedClock::new());
        let config = shared(DetectorConfig::default());
        let gate_slot: Arc<Mutex<Option<Arc<ConfirmationGate>>>> = Arc::new(Mutex::new(None));
        let observed = Arc::new(Mutex::new(Vec::new()));

        struct Reentrant {
            gate: Arc<Mutex<Option<Arc<ConfirmationGate>>>>,
            observed: Arc<Mutex<Vec<bool>>>,
        }
        impl EventSink for Reentrant {
            fn emit(&self, _event: ClapEvent) {
                if let Some(gate) = self.gate.lock().unwrap().as_ref() {
                    self.observed.lock().unwrap().push(gate.is_confirming());
                }
            }
        }

        let gate = ConfirmationGate::new(
            config,
            clock.clone(),
            clock.clone(),
            Arc::new(Reentrant {
                gate: Arc::clone(&gate_slot),
                observed: Arc::clone(&observed),
            }),
            Arc::new(TelemetryCollector::default()),
        );
        *gate_slot.lock().unwrap() = Some(Arc::clone(&gate));

        gate.on_strong();
        clock.advance(Duration::from_millis(300));
        assert_eq!(*observed.lock().unwrap(), vec![false]);

        // Break the reference cycle through the sink
        gate_slot.lock().unwrap().take();
    }
}
