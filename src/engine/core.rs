//! ClapDetector: lifecycle, event fan-out and runtime tuning for the
//! clap detection pipeline.
//!
//! The detector wires a capture backend to a [`FrameProcessor`] on every
//! start, owns the [`ConfirmationGate`] whose timing state outlives a single
//! capture session, and publishes events on a broadcast channel plus any
//! extra sinks registered at build time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::analysis::FrameProcessor;
use crate::config::{read_config, shared, DetectorConfig, SharedConfig, Tunable};
use crate::engine::backend::{AudioBackend, CaptureStartContext};
use crate::engine::events::{ClapCallbacks, ClapEvent, EventSink, FanoutSink};
use crate::engine::gate::ConfirmationGate;
use crate::engine::timer::{SystemTimeSource, TimeSource, TimerRuntime, TimerScheduler};
use crate::error::{log_audio_error, log_detector_error, AudioError, DetectorError};
use crate::telemetry::{LifecyclePhase, TelemetryCollector};

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Clap detector orchestrating capture, classification and confirmation.
pub struct ClapDetector {
    config: SharedConfig,
    backend: Arc<dyn AudioBackend>,
    gate: Arc<ConfirmationGate>,
    sink: Arc<dyn EventSink>,
    events_tx: broadcast::Sender<ClapEvent>,
    telemetry: Arc<TelemetryCollector>,
    lifecycle: Mutex<()>,
    listening: AtomicBool,
    // Declared last: dropped after everything that schedules on it
    _timer_runtime: Option<TimerRuntime>,
}

/// Builder for [`ClapDetector`]
pub struct ClapDetectorBuilder {
    backend: Arc<dyn AudioBackend>,
    config: DetectorConfig,
    timing: Option<(Arc<dyn TimeSource>, Arc<dyn TimerScheduler>)>,
    sinks: Vec<Arc<dyn EventSink>>,
    telemetry: Option<Arc<TelemetryCollector>>,
    event_capacity: usize,
}

impl ClapDetectorBuilder {
    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit clock and timer scheduler instead of a dedicated
    /// timer runtime on the system clock
    pub fn timing(mut self, clock: Arc<dyn TimeSource>, scheduler: Arc<dyn TimerScheduler>) -> Self {
        self.timing = Some((clock, scheduler));
        self
    }

    /// Register an extra event sink
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn callbacks(self, callbacks: ClapCallbacks) -> Self {
        self.sink(Arc::new(callbacks))
    }

    pub fn telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Capacity of the broadcast channel behind [`ClapDetector::subscribe`]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<ClapDetector, AudioError> {
        let (clock, scheduler, timer_runtime) = match self.timing {
            Some((clock, scheduler)) => (clock, scheduler, None),
            None => {
                let runtime = TimerRuntime::new()?;
                let timer = runtime.timer().ok_or_else(|| AudioError::TimerUnavailable {
                    reason: "timer runtime already shut down".to_string(),
                })?;
                let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::default());
                let scheduler: Arc<dyn TimerScheduler> = Arc::new(timer);
                (clock, scheduler, Some(runtime))
            }
        };

        let (events_tx, _) = broadcast::channel(self.event_capacity);
        let mut fanout = FanoutSink::new();
        fanout.push(Arc::new(events_tx.clone()));
        for sink in self.sinks {
            fanout.push(sink);
        }
        let sink: Arc<dyn EventSink> = Arc::new(fanout);

        let config = shared(self.config);
        let telemetry = self.telemetry.unwrap_or_default();
        let gate = ConfirmationGate::new(
            Arc::clone(&config),
            clock,
            scheduler,
            Arc::clone(&sink),
            Arc::clone(&telemetry),
        );

        Ok(ClapDetector {
            config,
            backend: self.backend,
            gate,
            sink,
            events_tx,
            telemetry,
            lifecycle: Mutex::new(()),
            listening: AtomicBool::new(false),
            _timer_runtime: timer_runtime,
        })
    }
}

impl ClapDetector {
    pub fn builder(backend: Arc<dyn AudioBackend>) -> ClapDetectorBuilder {
        ClapDetectorBuilder {
            backend,
            config: DetectorConfig::default(),
            timing: None,
            sinks: Vec::new(),
            telemetry: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Create a detector on the system clock with a dedicated timer runtime.
    pub fn new(config: DetectorConfig, backend: Arc<dyn AudioBackend>) -> Result<Self, AudioError> {
        Self::builder(backend).config(config).build()
    }

    /// Create a detector listening to the default input device.
    #[cfg(feature = "cpal")]
    pub fn with_default_input(config: DetectorConfig) -> Result<Self, AudioError> {
        Self::new(config, Arc::new(crate::engine::backend::CpalBackend::new()))
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start capturing. Calling while already listening is a no-op.
    pub fn start(&self) -> Result<(), AudioError> {
        let _guard = self.lifecycle.lock().map_err(|_| AudioError::LockPoisoned {
            component: "detector_lifecycle".to_string(),
        })?;

        if self.listening.load(Ordering::SeqCst) {
            debug!("[ClapDetector] start() while listening, ignoring");
            return Ok(());
        }

        let capture = read_config(&self.config).capture.clone();
        let processor = FrameProcessor::new(
            Arc::clone(&self.config),
            Arc::clone(&self.gate),
            Arc::clone(&self.sink),
            Arc::clone(&self.telemetry),
        );

        if let Err(err) = self.backend.start(CaptureStartContext { processor, capture }) {
            log_audio_error(&err, "ClapDetector::start");
            self.telemetry.record_lifecycle(LifecyclePhase::StartFailed);
            return Err(err);
        }

        self.listening.store(true, Ordering::SeqCst);
        self.telemetry.record_lifecycle(LifecyclePhase::Started);
        info!(
            "[ClapDetector] Listening ({} backend)",
            self.backend.name()
        );
        Ok(())
    }

    /// Stop capturing and cancel any pending confirmation. Calling while
    /// stopped is a no-op.
    pub fn stop(&self) -> Result<(), AudioError> {
        let _guard = self.lifecycle.lock().map_err(|_| AudioError::LockPoisoned {
            component: "detector_lifecycle".to_string(),
        })?;

        if !self.listening.load(Ordering::SeqCst) {
            debug!("[ClapDetector] stop() while stopped, ignoring");
            return Ok(());
        }

        // Stop capture first so no new strong onset can re-arm the gate
        let result = self.backend.stop();
        let cancelled = self.gate.cancel_pending();

        self.listening.store(false, Ordering::SeqCst);
        self.telemetry.record_lifecycle(LifecyclePhase::Stopped);
        info!(
            "[ClapDetector] Stopped{}",
            if cancelled {
                ", pending confirmation cancelled"
            } else {
                ""
            }
        );

        result.inspect_err(|err| log_audio_error(err, "ClapDetector::stop"))
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    // ========================================================================
    // TUNING
    // ========================================================================

    /// Update a detector parameter by name, effective from the next frame.
    ///
    /// Returns the value stored, which may be clamped or rounded.
    pub fn set_threshold(&self, name: &str, value: f64) -> Result<f64, DetectorError> {
        let tunable = name
            .parse::<Tunable>()
            .inspect_err(|err| log_detector_error(err, "ClapDetector::set_threshold"))?;
        self.set_tunable(tunable, value)
    }

    pub fn set_tunable(&self, tunable: Tunable, value: f64) -> Result<f64, DetectorError> {
        let stored = {
            let mut config = self
                .config
                .write()
                .map_err(|_| DetectorError::StatePoisoned)?;
            config.apply(tunable, value)
        }
        .inspect_err(|err| log_detector_error(err, "ClapDetector::set_tunable"))?;

        info!("[ClapDetector] {} set to {}", tunable, stored);
        Ok(stored)
    }

    /// Copy of the configuration currently in effect
    pub fn config_snapshot(&self) -> DetectorConfig {
        read_config(&self.config).clone()
    }

    // ========================================================================
    // EVENTS & STATE
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<ClapEvent> {
        self.events_tx.subscribe()
    }

    /// Event stream that skips over events missed by a lagging consumer
    pub fn event_stream(&self) -> impl Stream<Item = ClapEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }

    /// Whether a strong onset is waiting out the confirmation delay
    pub fn is_confirming(&self) -> bool {
        self.gate.is_confirming()
    }

    /// Time of the most recent confirmed clap
    pub fn last_clap_at(&self) -> Option<Instant> {
        self.gate.last_action()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl Drop for ClapDetector {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_audio_error(&err, "ClapDetector::drop");
        }
    }
}
