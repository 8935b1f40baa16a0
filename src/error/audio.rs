// Audio capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes carried by [`AudioError`].
///
/// Error code range: 1001-1006
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Capture hardware reported an error
    pub const HARDWARE_ERROR: i32 = 1001;

    /// Failed to open the capture stream
    pub const STREAM_OPEN_FAILED: i32 = 1002;

    /// Device sample format cannot be converted to f32 frames
    pub const UNSUPPORTED_FORMAT: i32 = 1003;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1004;

    /// Confirmation timer runtime could not be created
    pub const TIMER_UNAVAILABLE: i32 = 1005;

    /// Capture stream disconnected or its thread went away
    pub const STREAM_FAILURE: i32 = 1006;
}

/// Log an audio error with structured context
///
/// Fields: context, error code, component and message. Logging is
/// non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=CaptureBackend, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover capture backend operations: stream setup, device
/// access and the timer runtime that backs clap confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Hardware error occurred
    HardwareError { details: String },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Device delivers a sample format the engine does not read
    UnsupportedFormat { format: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Timer runtime could not be started
    TimerUnavailable { reason: String },

    /// Stream thread disconnected unexpectedly
    StreamFailure { reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::UnsupportedFormat { .. } => AudioErrorCodes::UNSUPPORTED_FORMAT,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::TimerUnavailable { .. } => AudioErrorCodes::TIMER_UNAVAILABLE,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Unsupported input sample format: {}", format)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::TimerUnavailable { reason } => {
                format!("Confirmation timer unavailable: {}", reason)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::HardwareError {
                details: "test".to_string()
            }
            .code(),
            1001
        );
        assert_eq!(
            AudioError::StreamOpenFailed {
                reason: "test".to_string()
            }
            .code(),
            1002
        );
        assert_eq!(
            AudioError::UnsupportedFormat {
                format: "I24".to_string()
            }
            .code(),
            1003
        );
        assert_eq!(
            AudioError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            1004
        );
        assert_eq!(
            AudioError::TimerUnavailable {
                reason: "test".to_string()
            }
            .code(),
            1005
        );
        assert_eq!(
            AudioError::StreamFailure {
                reason: "test".to_string()
            }
            .code(),
            1006
        );
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::HardwareError {
            details: "test error".to_string(),
        };
        assert_eq!(err.message(), "Hardware error: test error");

        let err = AudioError::UnsupportedFormat {
            format: "U8".to_string(),
        };
        assert!(err.message().contains("U8"));

        let err = AudioError::LockPoisoned {
            component: "ClapDetector".to_string(),
        };
        assert!(err.message().contains("ClapDetector"));
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::StreamOpenFailed {
            reason: "No default input device found".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains(&err.code().to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("test io error");
        let audio_err: AudioError = io_err.into();
        match audio_err {
            AudioError::HardwareError { details } => {
                assert!(details.contains("test io error"));
            }
            _ => panic!("Expected HardwareError"),
        }
    }
}
