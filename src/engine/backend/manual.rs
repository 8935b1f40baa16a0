use std::sync::{Mutex, MutexGuard};

use crate::analysis::{AudioFrame, FrameAssembler, FrameProcessor, OnsetDecision};
use crate::error::AudioError;

use super::{AudioBackend, CaptureStartContext};

struct ManualCapture {
    processor: FrameProcessor,
    assembler: FrameAssembler,
}

#[derive(Default)]
struct ManualState {
    capture: Option<ManualCapture>,
    active: bool,
    /// Bumped on every start and stop
    session: u64,
}

/// Backend driven by the caller instead of a device.
///
/// Used by tests, offline replay and embedding code that already has its own
/// capture loop. Frames pushed while stopped are discarded.
///
/// The state lock is not held while a frame is processed, so event sinks may
/// start or stop the detector from inside a callback. Pushes are serialised;
/// a sink must not push samples itself.
pub struct ManualBackend {
    state: Mutex<ManualState>,
    feed: Mutex<()>,
    sample_rate: u32,
}

impl ManualBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Mutex::new(ManualState::default()),
            feed: Mutex::new(()),
            sample_rate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_session(&self, session: u64) -> bool {
        let state = self.lock();
        state.active && state.session == session
    }

    /// Run `f` on the capture session with the state lock released
    ///
    /// The capture is put back afterwards unless the backend was stopped or
    /// restarted meanwhile.
    fn with_capture<R>(&self, f: impl FnOnce(&mut ManualCapture, u64) -> R) -> Option<R> {
        let _feed = self
            .feed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (mut capture, session) = {
            let mut state = self.lock();
            if !state.active {
                return None;
            }
            (state.capture.take()?, state.session)
        };

        let result = f(&mut capture, session);

        let mut state = self.lock();
        if state.active && state.session == session {
            state.capture = Some(capture);
        }
        Some(result)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().active
    }

    /// Process one complete frame; `None` while stopped
    pub fn push_frame(&self, frame: &AudioFrame<'_>) -> Option<OnsetDecision> {
        self.with_capture(|capture, _| capture.processor.process(frame))
    }

    /// Append mono samples, processing every complete frame
    ///
    /// Returns the decisions for the frames completed by this call. Frames
    /// after a stop issued from an event callback are dropped.
    pub fn push_samples(&self, samples: &[f32]) -> Vec<OnsetDecision> {
        let sample_rate = self.sample_rate;
        self.with_capture(|capture, session| {
            let mut decisions = Vec::new();
            let processor = &mut capture.processor;
            capture.assembler.push(samples, |frame| {
                if self.is_session(session) {
                    decisions.push(processor.process(&AudioFrame::mono(frame, sample_rate)));
                }
            });
            decisions
        })
        .unwrap_or_default()
    }
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new(48_000)
    }
}

impl AudioBackend for ManualBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError> {
        let mut state = self.lock();
        state.capture = Some(ManualCapture {
            processor: ctx.processor,
            assembler: FrameAssembler::new(ctx.capture.frame_size),
        });
        state.active = true;
        state.session = state.session.wrapping_add(1);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let mut state = self.lock();
        state.capture = None;
        state.active = false;
        state.session = state.session.wrapping_add(1);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}
