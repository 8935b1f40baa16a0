//! CPAL-based capture backend for desktop platforms (Linux, macOS, Windows)
//!
//! The input stream lives on its own thread because `cpal::Stream` is not
//! `Send` on every platform. The device callback copies the first channel
//! into pooled buffers; the analysis thread assembles frames and runs the
//! processor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use crate::analysis::spawn_analysis_thread;
use crate::audio::buffer_pool::{AudioThreadChannels, BufferPool};
use crate::error::AudioError;

use super::{AudioBackend, CaptureStartContext};

struct RunningCapture {
    stop_tx: mpsc::Sender<()>,
    capture_thread: JoinHandle<()>,
    analysis_thread: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

/// Capture backend reading the default input device
#[derive(Default)]
pub struct CpalBackend {
    state: Mutex<Option<RunningCapture>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunningCapture>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn build_input_stream(mut channels: AudioThreadChannels) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default input device found".to_string(),
        })?;

    let config = device
        .default_input_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat {
            format: format!("{:?}", config.sample_format()),
        });
    }

    let stream_config: cpal::StreamConfig = config.into();
    let channels_count = stream_config.channels.max(1) as usize;
    let sample_rate = stream_config.sample_rate.0;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // No free buffer means analysis is behind: drop this callback
                if let Ok(mut buffer) = channels.pool_consumer.pop() {
                    buffer.clear();
                    buffer.extend(data.iter().step_by(channels_count).copied());
                    let _ = channels.data_producer.push(buffer);
                }
            },
            |err| warn!("[CpalBackend] Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

    stream.play().map_err(|e| AudioError::HardwareError {
        details: format!("Input start failed: {}", e),
    })?;

    Ok((stream, sample_rate))
}

impl AudioBackend for CpalBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError> {
        let mut state = self.lock();
        if state.is_some() {
            return Ok(());
        }

        let (audio_channels, analysis_channels) =
            BufferPool::new(ctx.capture.buffer_pool_size, ctx.capture.frame_size)
                .split_for_threads();

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, AudioError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let capture_thread = thread::Builder::new()
            .name("clap-capture".to_string())
            .spawn(move || match build_input_stream(audio_channels) {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    // Blocks until stop sends or the sender is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(sample_rate)) => sample_rate,
            Ok(Err(err)) => {
                let _ = capture_thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = capture_thread.join();
                return Err(AudioError::StreamFailure {
                    reason: "capture thread exited before opening the stream".to_string(),
                });
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let analysis_thread = match spawn_analysis_thread(
            analysis_channels,
            ctx.processor,
            sample_rate,
            ctx.capture.frame_size,
            Arc::clone(&running),
        ) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = stop_tx.send(());
                let _ = capture_thread.join();
                return Err(err);
            }
        };

        info!(
            "[CpalBackend] Capturing at {} Hz, {} samples per frame",
            sample_rate, ctx.capture.frame_size
        );

        *state = Some(RunningCapture {
            stop_tx,
            capture_thread,
            analysis_thread,
            running,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let Some(capture) = self.lock().take() else {
            return Ok(());
        };

        // The analysis thread checks this before every frame, so the
        // processor is not called again once it is cleared
        capture.running.store(false, Ordering::SeqCst);
        let _ = capture.stop_tx.send(());
        let capture_result = capture.capture_thread.join();

        // A sink stopping the detector runs on the analysis thread itself;
        // it exits on its own once the current frame returns
        let on_analysis_thread = capture.analysis_thread.thread().id() == thread::current().id();
        let analysis_result = if on_analysis_thread {
            debug!("[CpalBackend] Stopped from the analysis thread, detaching it");
            Ok(())
        } else {
            capture.analysis_thread.join()
        };

        if capture_result.is_err() || analysis_result.is_err() {
            return Err(AudioError::StreamFailure {
                reason: "capture worker panicked".to_string(),
            });
        }
        info!("[CpalBackend] Capture stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}
