//! Engine module housing the detector core.
//!
//! This module exposes trait-based capture backends (`backend`), the
//! debounce/cooldown gate (`gate`), clocks and timers (`timer`), output
//! events (`events`) and the `ClapDetector` orchestration layer (`core`).

pub mod backend;
pub mod core;
pub mod events;
pub mod gate;
pub mod timer;

#[cfg(feature = "cpal")]
pub use backend::CpalBackend;
pub use backend::{AudioBackend, CaptureStartContext, ManualBackend};
pub use self::core::{ClapDetector, ClapDetectorBuilder};
pub use events::{ClapCallbacks, ClapEvent, EventSink, FanoutSink};
pub use gate::{ConfirmationGate, GateDecision};
pub use timer::{
    ScheduledTimer, SimulatedClock, SystemTimeSource, TimeSource, TimerRuntime, TimerScheduler,
    TokioClock, TokioTimer,
};
