// Clap Engine - Rust Audio Engine
// Hand-clap detection with debounce confirmation over a lock-free capture path

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use analysis::{Classification, FrameStatistics, OnsetDecision};
pub use config::{DetectorConfig, Tunable};
pub use engine::{AudioBackend, ClapCallbacks, ClapDetector, ClapEvent, ManualBackend};
pub use error::{AudioError, DetectorError, ErrorCode};

#[cfg(feature = "cpal")]
pub use engine::CpalBackend;
