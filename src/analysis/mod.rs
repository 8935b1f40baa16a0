// Analysis module - per-frame clap detection pipeline
//
// Turns captured audio into clap events. The capture side hands over frames;
// this module measures them, classifies them and routes the result.
//
// Architecture:
// - FrameProcessor: FrameAnalyzer -> OnsetClassifier -> routing
//   (Weak events straight to the sink, Strong onsets to the ConfirmationGate)
// - AnalysisThread: loop draining the buffer pool's DATA_QUEUE, assembling
//   fixed-size frames and feeding them to a FrameProcessor
//
// The processor is owned by exactly one thread at a time, so the energy
// history needs no lock. Only the timing state in the gate is shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::PopError;
use tracing::{debug, info, trace, warn};

use crate::audio::buffer_pool::AnalysisThreadChannels;
use crate::config::{read_config, SharedConfig};
use crate::engine::events::{ClapEvent, EventSink};
use crate::engine::gate::{ConfirmationGate, GateDecision};
use crate::error::AudioError;
use crate::telemetry::TelemetryCollector;

pub mod frame;
pub mod history;
pub mod onset;

pub use frame::{analyze, AudioFrame, FrameStatistics, RMS_FLOOR};
pub use history::EnergyHistory;
pub use onset::{Classification, OnsetClassifier, OnsetDecision};

/// Per-frame pipeline from samples to routed clap events
pub struct FrameProcessor {
    config: SharedConfig,
    classifier: OnsetClassifier,
    gate: Arc<ConfirmationGate>,
    sink: Arc<dyn EventSink>,
    telemetry: Arc<TelemetryCollector>,
    frames_processed: u64,
}

impl FrameProcessor {
    pub fn new(
        config: SharedConfig,
        gate: Arc<ConfirmationGate>,
        sink: Arc<dyn EventSink>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        let classifier = OnsetClassifier::with_config(&read_config(&config).classifier);
        Self {
            config,
            classifier,
            gate,
            sink,
            telemetry,
            frames_processed: 0,
        }
    }

    /// Analyse, classify and route one frame
    ///
    /// Never blocks on timers: a strong onset only arms the gate.
    pub fn process(&mut self, frame: &AudioFrame<'_>) -> OnsetDecision {
        let (classifier_config, log_every) = {
            let config = read_config(&self.config);
            (config.classifier.clone(), config.capture.log_every_n_frames)
        };

        let stats = analyze(frame);
        let decision = self.classifier.classify(&stats, &classifier_config);
        self.frames_processed += 1;
        let index = self.frames_processed;

        if log_every > 0 && index % log_every == 0 {
            debug!(
                "[FrameProcessor] Frame {}: rms={:.4} peak={:.4} ratio={:.2} background={:.4}",
                index, stats.rms, stats.peak, stats.ratio, decision.background
            );
            self.telemetry.record_frame_levels(index, &stats, &decision);
        }

        match decision.classification {
            Classification::Weak => {
                debug!(
                    "[FrameProcessor] Weak clap: rms={:.4} ratio={:.2}",
                    decision.current, decision.ratio
                );
                self.telemetry.record_classification(index, &decision);
                self.sink.emit(ClapEvent::Weak);
            }
            Classification::Strong => {
                info!(
                    "[FrameProcessor] Strong onset: rms={:.4} ratio={:.2} onset_ratio={:.1}",
                    decision.current,
                    decision.ratio,
                    decision.onset_ratio()
                );
                self.telemetry.record_classification(index, &decision);
                if let GateDecision::Ignored { remaining, .. } = self.gate.on_strong() {
                    trace!(
                        "[FrameProcessor] Frame {} in cooldown ({}ms left)",
                        index,
                        remaining.as_millis()
                    );
                }
            }
            Classification::None if decision.onset => {
                trace!(
                    "[FrameProcessor] Onset without clap transient: ratio={:.2}",
                    decision.ratio
                );
            }
            Classification::None => {}
        }

        decision
    }

    /// Forget the energy history so the next frames are a cold start
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.frames_processed = 0;
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}

/// Groups arbitrary-length capture buffers into fixed-size frames
pub struct FrameAssembler {
    pending: Vec<f32>,
    frame_size: usize,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            pending: Vec::with_capacity(frame_size * 2),
            frame_size,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of buffered samples not yet emitted as a frame
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and hand every complete frame to `on_frame`
    pub fn push(&mut self, samples: &[f32], mut on_frame: impl FnMut(&[f32])) {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.frame_size * self.frame_size;
        if complete == 0 {
            return;
        }
        for chunk in self.pending[..complete].chunks_exact(self.frame_size) {
            on_frame(chunk);
        }
        self.pending.drain(..complete);
    }
}

struct AnalysisWorker {
    channels: AnalysisThreadChannels,
    processor: FrameProcessor,
    assembler: FrameAssembler,
    sample_rate: u32,
    running: Arc<AtomicBool>,
}

impl AnalysisWorker {
    fn run(mut self) {
        info!(
            "[AnalysisThread] Starting analysis loop ({} Hz, {} samples per frame)",
            self.sample_rate,
            self.assembler.frame_size()
        );

        while self.running.load(Ordering::SeqCst) {
            let buffer = match self.channels.data_consumer.pop() {
                Ok(buffer) => buffer,
                Err(PopError::Empty) => {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
            };

            // Checked per frame: a sink may stop capture from inside process()
            let processor = &mut self.processor;
            let running = &self.running;
            let sample_rate = self.sample_rate;
            self.assembler.push(&buffer, |samples| {
                if running.load(Ordering::SeqCst) {
                    processor.process(&AudioFrame::mono(samples, sample_rate));
                }
            });

            // Return buffer to pool immediately
            if self.channels.pool_producer.push(buffer).is_err() {
                warn!("[AnalysisThread] Pool queue full, dropping buffer");
            }
        }

        info!("[AnalysisThread] Stopped, exiting");
        debug!(
            "[AnalysisThread] Processed {} frames",
            self.processor.frames_processed()
        );
    }
}

/// Spawn the analysis thread draining `channels` until `running` clears
pub fn spawn_analysis_thread(
    channels: AnalysisThreadChannels,
    processor: FrameProcessor,
    sample_rate: u32,
    frame_size: usize,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, AudioError> {
    let worker = AnalysisWorker {
        channels,
        processor,
        assembler: FrameAssembler::new(frame_size),
        sample_rate,
        running,
    };

    let handle = thread::Builder::new()
        .name("clap-analysis".to_string())
        .spawn(move || worker.run())?;
    Ok(handle)
}
