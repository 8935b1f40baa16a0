//! Offline replay: run recorded or synthetic audio through a real detector
//! on a virtual clock, faster than real time.
//!
//! Frames are pushed through a [`ManualBackend`] and the [`SimulatedClock`]
//! advances by each frame's duration, so confirmation and cooldown timing
//! behave exactly as they would live.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::{AudioFrame, Classification, FrameAssembler};
use crate::config::DetectorConfig;
use crate::engine::backend::ManualBackend;
use crate::engine::core::ClapDetector;
use crate::engine::events::{ClapEvent, EventSink};
use crate::engine::timer::SimulatedClock;
use crate::error::AudioError;
use crate::telemetry::{TelemetryCollector, TelemetrySnapshot};

/// Event with its position on the replay timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Offset from the start of the replay, in milliseconds
    pub at_ms: u64,
    pub event: ClapEvent,
}

/// Outcome of a replay run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub sample_rate: u32,
    pub frames: u64,
    pub strong_frames: u64,
    pub weak_frames: u64,
    pub duration_ms: u64,
    pub events: Vec<TimedEvent>,
    pub telemetry: TelemetrySnapshot,
}

impl ReplayReport {
    pub fn confirmed(&self) -> usize {
        self.count(ClapEvent::Confirmed)
    }

    pub fn weak(&self) -> usize {
        self.count(ClapEvent::Weak)
    }

    fn count(&self, kind: ClapEvent) -> usize {
        self.events.iter().filter(|e| e.event == kind).count()
    }
}

struct TimelineSink {
    clock: Arc<SimulatedClock>,
    events: Mutex<Vec<TimedEvent>>,
}

impl EventSink for TimelineSink {
    fn emit(&self, event: ClapEvent) {
        let at_ms = self.clock.elapsed().as_millis() as u64;
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(TimedEvent { at_ms, event });
    }
}

/// Drives a detector from in-memory samples on a virtual clock
pub struct ReplayHarness {
    detector: ClapDetector,
    backend: Arc<ManualBackend>,
    clock: Arc<SimulatedClock>,
    timeline: Arc<TimelineSink>,
    telemetry: Arc<TelemetryCollector>,
    assembler: FrameAssembler,
    sample_rate: u32,
    frames: u64,
    strong_frames: u64,
    weak_frames: u64,
}

impl ReplayHarness {
    pub fn new(config: DetectorConfig, sample_rate: u32) -> Result<Self, AudioError> {
        let frame_size = config.capture.frame_size;
        let backend = Arc::new(ManualBackend::new(sample_rate));
        let clock = Arc::new(SimulatedClock::new());
        let timeline = Arc::new(TimelineSink {
            clock: Arc::clone(&clock),
            events: Mutex::new(Vec::new()),
        });
        let telemetry = Arc::new(TelemetryCollector::new(256, 1024));

        let detector = ClapDetector::builder(backend.clone())
            .config(config)
            .timing(clock.clone(), clock.clone())
            .sink(timeline.clone())
            .telemetry(Arc::clone(&telemetry))
            .build()?;
        detector.start()?;

        Ok(Self {
            detector,
            backend,
            clock,
            timeline,
            telemetry,
            assembler: FrameAssembler::new(frame_size),
            sample_rate,
            frames: 0,
            strong_frames: 0,
            weak_frames: 0,
        })
    }

    pub fn detector(&self) -> &ClapDetector {
        &self.detector
    }

    /// Virtual time elapsed so far
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Feed samples; each completed frame advances the clock by its duration
    pub fn feed(&mut self, samples: &[f32]) {
        let backend = &self.backend;
        let clock = &self.clock;
        let sample_rate = self.sample_rate;
        let mut classes = Vec::new();

        self.assembler.push(samples, |chunk| {
            let frame = AudioFrame::mono(chunk, sample_rate);
            if let Some(decision) = backend.push_frame(&frame) {
                classes.push(decision.classification);
            }
            clock.advance(frame.duration());
        });

        for class in classes {
            self.frames += 1;
            match class {
                Classification::Strong => self.strong_frames += 1,
                Classification::Weak => self.weak_frames += 1,
                Classification::None => {}
            }
        }
    }

    /// Let virtual time pass without audio, firing due timers
    pub fn idle(&mut self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<TimedEvent> {
        self.timeline
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Let pending confirmations resolve, stop the detector and report
    pub fn finish(mut self) -> Result<ReplayReport, AudioError> {
        let debounce = self.detector.config_snapshot().debounce;
        self.idle(debounce.confirmation_delay());
        self.detector.stop()?;

        Ok(ReplayReport {
            sample_rate: self.sample_rate,
            frames: self.frames,
            strong_frames: self.strong_frames,
            weak_frames: self.weak_frames,
            duration_ms: self.clock.elapsed().as_millis() as u64,
            events: self.events(),
            telemetry: self.telemetry.snapshot(),
        })
    }
}

/// Replay a whole clip in one call
pub fn replay(
    samples: &[f32],
    sample_rate: u32,
    config: DetectorConfig,
) -> Result<ReplayReport, AudioError> {
    let mut harness = ReplayHarness::new(config, sample_rate)?;
    harness.feed(samples);
    harness.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synth::SignalBuilder;

    const RATE: u32 = 48_000;

    fn builder(seed: u64) -> SignalBuilder {
        SignalBuilder::new(RATE, 2048, seed)
    }

    #[test]
    fn test_single_clap_confirmed_after_delay() {
        let signal = builder(1).quiet(10).clap(0.8).quiet(10).build();
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();

        assert_eq!(report.frames, 21);
        assert_eq!(report.strong_frames, 1);
        assert_eq!(report.confirmed(), 1);

        // Clap frame starts at 10 * 2048 samples, confirmation 300ms later
        let clap_ms = 10 * 2048 * 1000 / RATE as u64;
        assert_eq!(report.events[0].at_ms, clap_ms + 300);
    }

    #[test]
    fn test_rapid_claps_confirm_once() {
        // Claps 5 frames (213ms) apart keep restarting the confirmation window
        let signal = builder(2)
            .quiet(10)
            .clap(0.8)
            .quiet(4)
            .clap(0.8)
            .quiet(4)
            .clap(0.8)
            .quiet(15)
            .build();
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();

        assert_eq!(report.strong_frames, 3);
        assert_eq!(report.confirmed(), 1);
    }

    #[test]
    fn test_claps_spaced_past_cooldown_confirm_each() {
        let signal = builder(3)
            .quiet(10)
            .clap(0.8)
            .quiet_for(Duration::from_millis(2000))
            .clap(0.8)
            .quiet(10)
            .build();
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();
        assert_eq!(report.confirmed(), 2);
    }

    #[test]
    fn test_soft_clap_reports_weak_only() {
        let signal = builder(4).quiet(10).soft_clap(0.5).quiet(10).build();
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();
        assert_eq!(report.weak(), 1);
        assert_eq!(report.confirmed(), 0);
    }

    #[test]
    fn test_speech_like_tone_is_ignored() {
        let signal = builder(5)
            .quiet(10)
            .tone(220.0, 0.4, 30)
            .quiet(10)
            .build();
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();
        assert!(report.events.is_empty());
    }

    #[test]
    fn test_clap_at_end_still_confirms_on_finish() {
        let signal = builder(6).quiet(10).clap(0.8).build();
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();
        assert_eq!(report.confirmed(), 1);
    }

    #[test]
    fn test_partial_trailing_frame_is_not_processed() {
        let mut signal = builder(7).quiet(5).build();
        signal.extend_from_slice(&[0.0; 100]);
        let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();
        assert_eq!(report.frames, 5);
    }
}
