// Detector error types: runtime parameter updates and shared state access

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Detector error code constants
///
/// Error code range: 2001-2003
pub struct DetectorErrorCodes {}

impl DetectorErrorCodes {
    /// Tunable name is not recognised
    pub const UNKNOWN_PARAMETER: i32 = 2001;

    /// Tunable value is out of range or not finite
    pub const INVALID_VALUE: i32 = 2002;

    /// Shared detector configuration lock was poisoned
    pub const STATE_POISONED: i32 = 2003;
}

/// Log a detector error with structured context
pub fn log_detector_error(err: &DetectorError, context: &str) {
    error!(
        "Detector error in {}: code={}, component=ClapDetector, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Detector-related errors
///
/// Raised by `ClapDetector::set_threshold` and configuration access. The
/// frame path itself never produces errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// No tunable with this name
    UnknownParameter { name: String },

    /// Value rejected for the named tunable
    InvalidValue {
        name: String,
        value: f64,
        reason: String,
    },

    /// Configuration RwLock was poisoned
    StatePoisoned,
}

impl ErrorCode for DetectorError {
    fn code(&self) -> i32 {
        match self {
            DetectorError::UnknownParameter { .. } => DetectorErrorCodes::UNKNOWN_PARAMETER,
            DetectorError::InvalidValue { .. } => DetectorErrorCodes::INVALID_VALUE,
            DetectorError::StatePoisoned => DetectorErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            DetectorError::UnknownParameter { name } => {
                format!("Unknown detector parameter '{}'", name)
            }
            DetectorError::InvalidValue {
                name,
                value,
                reason,
            } => {
                format!("Invalid value {} for '{}': {}", value, name, reason)
            }
            DetectorError::StatePoisoned => "Detector configuration lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DetectorError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DetectorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_error_codes() {
        assert_eq!(
            DetectorError::UnknownParameter {
                name: "x".to_string()
            }
            .code(),
            2001
        );
        assert_eq!(
            DetectorError::InvalidValue {
                name: "history_length".to_string(),
                value: 1.0,
                reason: "too short".to_string()
            }
            .code(),
            2002
        );
        assert_eq!(DetectorError::StatePoisoned.code(), 2003);
    }

    #[test]
    fn test_detector_error_messages() {
        let err = DetectorError::InvalidValue {
            name: "onset_multiplier".to_string(),
            value: -1.0,
            reason: "must be greater than 0".to_string(),
        };
        assert!(err.message().contains("onset_multiplier"));
        assert!(err.message().contains("-1"));

        let err = DetectorError::UnknownParameter {
            name: "gain".to_string(),
        };
        assert!(err.message().contains("'gain'"));
    }
}
