// Error types for the clap detection engine
//
// This module defines custom error types for capture and detector operations,
// providing structured error handling with stable numeric codes.

mod audio;
mod detector;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use detector::{log_detector_error, DetectorError, DetectorErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling for
/// whatever layer embeds the engine.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
