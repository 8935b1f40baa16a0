//! Testability harness utilities.
//!
//! Deterministic signal synthesis, WAV I/O and an offline replay harness
//! that drives a real detector on a virtual clock. Used by the unit and
//! integration tests and by the `clap_cli` replay/simulate commands.

pub mod replay;
pub mod synth;
pub mod wav;

pub use replay::{replay, ReplayHarness, ReplayReport, TimedEvent};
pub use synth::SignalBuilder;
pub use wav::{read_wav, write_wav, WavClip};
