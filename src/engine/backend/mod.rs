//! Capture backend abstractions for the detector core.

use crate::analysis::FrameProcessor;
use crate::config::CaptureConfig;
use crate::error::AudioError;

/// Context provided to capture backends when the detector starts.
///
/// The backend owns the processor for the lifetime of the capture session
/// and feeds it every frame it captures, in order, from one thread at a time.
pub struct CaptureStartContext {
    pub processor: FrameProcessor,
    pub capture: CaptureConfig,
}

/// Trait implemented by audio capture backends.
///
/// `start` is only called while stopped and `stop` only while started; the
/// detector serialises both. After `stop` returns the backend must not call
/// into the processor again.
pub trait AudioBackend: Send + Sync {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError>;
    fn stop(&self) -> Result<(), AudioError>;
    fn name(&self) -> &'static str;
}

#[cfg(feature = "cpal")]
mod cpal;
#[cfg(feature = "cpal")]
pub use self::cpal::CpalBackend;

mod manual;
pub use manual::ManualBackend;
