//! Integration tests for the clap detector's public API
//!
//! These drive a real `ClapDetector` through `ReplayHarness` (virtual clock,
//! manual backend) and cover:
//! - Confirmation timing and restart on rapid onsets
//! - Cooldown suppression and recovery
//! - Runtime threshold changes and lifecycle calls mid-stream
//! - WAV round trip into the replay pipeline

use std::sync::Arc;
use std::time::Duration;

use clap_engine::engine::timer::SimulatedClock;
use clap_engine::telemetry::MetricEvent;
use clap_engine::testing::{read_wav, replay, write_wav, ReplayHarness, SignalBuilder};
use clap_engine::{ClapDetector, ClapEvent, DetectorConfig, DetectorError, ManualBackend};

const RATE: u32 = 48_000;
const FRAME: usize = 2048;

fn frame_ms(frames: u64) -> u64 {
    frames * FRAME as u64 * 1000 / RATE as u64
}

#[test]
fn test_confirmation_fires_after_last_onset_of_a_burst() {
    let signal = SignalBuilder::new(RATE, FRAME, 11)
        .quiet(10)
        .clap(0.8)
        .quiet(4)
        .clap(0.8)
        .quiet(15)
        .build();

    let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();

    assert_eq!(report.strong_frames, 2);
    assert_eq!(report.confirmed(), 1);
    // Second clap sits at frame 15; the timer restarted there
    assert_eq!(report.events[0].at_ms, frame_ms(15) + 300);

    let restarts = report.telemetry.count(|e| {
        matches!(
            e,
            MetricEvent::ConfirmationArmed {
                restarted: true,
                ..
            }
        )
    });
    assert_eq!(restarts, 1);
}

#[test]
fn test_clap_during_cooldown_is_ignored_then_detection_recovers() {
    let signal = SignalBuilder::new(RATE, FRAME, 12)
        .quiet(10)
        .clap(0.8)
        .quiet(10)
        .clap(0.8)
        .quiet_for(Duration::from_millis(1600))
        .clap(0.8)
        .quiet(10)
        .build();

    let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();

    assert_eq!(report.strong_frames, 3);
    assert_eq!(report.confirmed(), 2);
    let ignored = report
        .telemetry
        .count(|e| matches!(e, MetricEvent::ClapIgnored { .. }));
    assert_eq!(ignored, 1);
}

#[test]
fn test_weak_events_are_not_debounced() {
    let signal = SignalBuilder::new(RATE, FRAME, 13)
        .quiet(10)
        .soft_clap(0.5)
        .quiet(6)
        .soft_clap(0.5)
        .quiet(6)
        .build();

    let report = replay(&signal, RATE, DetectorConfig::default()).unwrap();

    assert_eq!(report.weak(), 2);
    assert_eq!(report.confirmed(), 0);
    // Forwarded on the frame itself, without waiting for any timer
    assert_eq!(report.events[0].at_ms, frame_ms(10));
}

#[test]
fn test_harness_drives_detector_incrementally() {
    let mut harness = ReplayHarness::new(DetectorConfig::default(), RATE).unwrap();
    let builder = || SignalBuilder::new(RATE, FRAME, 14);

    harness.feed(&builder().quiet(10).clap(0.8).build());
    assert!(harness.detector().is_confirming());
    assert!(harness.events().is_empty());

    // Feeding the clap frame already moved the clock one frame past it
    harness.idle(Duration::from_millis(250));
    assert!(harness.events().is_empty());
    harness.idle(Duration::from_millis(10));
    assert_eq!(harness.events().len(), 1);
    assert_eq!(harness.events()[0].event, ClapEvent::Confirmed);

    let report = harness.finish().unwrap();
    assert_eq!(report.confirmed(), 1);
}

#[test]
fn test_raising_threshold_mid_stream_silences_claps() {
    let mut harness = ReplayHarness::new(DetectorConfig::default(), RATE).unwrap();
    harness.feed(&SignalBuilder::new(RATE, FRAME, 15).quiet(10).build());

    let stored = harness
        .detector()
        .set_threshold("amplitude_threshold", 0.5)
        .unwrap();
    assert!((stored - 0.5).abs() < 1e-6);

    harness.feed(&SignalBuilder::new(RATE, FRAME, 16).clap(0.8).quiet(10).build());
    let report = harness.finish().unwrap();
    assert!(report.events.is_empty());
}

#[test]
fn test_stop_mid_confirmation_drops_the_clap() {
    let mut harness = ReplayHarness::new(DetectorConfig::default(), RATE).unwrap();
    harness.feed(&SignalBuilder::new(RATE, FRAME, 17).quiet(10).clap(0.8).build());
    assert!(harness.detector().is_confirming());

    harness.detector().stop().unwrap();
    assert!(!harness.detector().is_listening());
    harness.idle(Duration::from_secs(1));

    let report = harness.finish().unwrap();
    assert_eq!(report.confirmed(), 0);
}

#[test]
fn test_unknown_parameter_is_reported() {
    let backend = Arc::new(ManualBackend::new(RATE));
    let clock = Arc::new(SimulatedClock::new());
    let detector = ClapDetector::builder(backend)
        .timing(clock.clone(), clock)
        .build()
        .unwrap();

    let err = detector.set_threshold("sensitivity", 1.0).unwrap_err();
    assert!(matches!(err, DetectorError::UnknownParameter { .. }));
}

#[test]
fn test_wav_recording_replays_like_the_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("claps.wav");
    let signal = SignalBuilder::new(RATE, FRAME, 18)
        .quiet(10)
        .clap(0.8)
        .quiet_for(Duration::from_millis(2000))
        .clap(0.8)
        .quiet(10)
        .build();
    write_wav(&path, &signal, RATE).unwrap();

    let clip = read_wav(&path).unwrap();
    assert_eq!(clip.sample_rate, RATE);

    let from_wav = replay(&clip.samples, clip.sample_rate, DetectorConfig::default()).unwrap();
    let direct = replay(&signal, RATE, DetectorConfig::default()).unwrap();
    assert_eq!(from_wav.confirmed(), 2);
    assert_eq!(from_wav.events, direct.events);
}
