//! Configuration management for dynamic parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling threshold experiments without recompilation. Every section
//! falls back to its defaults, so a file only needs the keys it changes.
//! Individual values can also be adjusted while listening through
//! [`DetectorConfig::apply`] (exposed as `ClapDetector::set_threshold`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::audio::buffer_pool::{DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE};
use crate::error::DetectorError;

/// Lower clamp applied to the amplitude floor
pub const MIN_AMPLITUDE_THRESHOLD: f32 = 0.01;
/// Upper clamp applied to the amplitude floor
pub const MAX_AMPLITUDE_THRESHOLD: f32 = 0.5;
/// Background estimation needs at least one previous frame
pub const MIN_HISTORY_LENGTH: usize = 2;
/// Longest energy history; the ring buffer is allocated up front
pub const MAX_HISTORY_LENGTH: usize = 1024;
/// Capture buffers are pre-allocated, so both pool dimensions are capped
pub const MAX_FRAME_SIZE: usize = 1 << 16;
pub const MAX_BUFFER_POOL_SIZE: usize = 1024;

/// Complete detector configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Onset classifier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum RMS a frame needs before it can count as an onset
    pub amplitude_threshold: f32,
    /// Peak/RMS ratio above which an onset is a clap
    pub strong_ratio_threshold: f32,
    /// Peak/RMS ratio above which an onset is a clap-like but weak sound
    pub weak_ratio_threshold: f32,
    /// Current energy must exceed background by this factor
    pub onset_multiplier: f32,
    /// Number of RMS values kept for background estimation
    pub history_length: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.08,
            // Claps have sharp transients with ratios typically 4-10+
            strong_ratio_threshold: 4.0,
            // Random noise typically stays below 2.0
            weak_ratio_threshold: 2.5,
            onset_multiplier: 8.0,
            history_length: 5,
        }
    }
}

/// Confirmation delay and cooldown window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period after the last strong frame before a clap is confirmed
    pub confirmation_delay_ms: u64,
    /// Refractory window after a confirmation during which claps are dropped
    pub cooldown_ms: u64,
}

impl DebounceConfig {
    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            confirmation_delay_ms: 300,
            cooldown_ms: 1500,
        }
    }
}

/// Capture-side configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Samples per analysed frame (2048 holds ~42ms @ 48kHz, a full clap attack)
    pub frame_size: usize,
    /// Size of buffer pool for real-time audio transfer
    pub buffer_pool_size: usize,
    /// Log frame levels every N frames (0 disables)
    pub log_every_n_frames: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_BUFFER_SIZE,
            buffer_pool_size: DEFAULT_BUFFER_COUNT,
            log_every_n_frames: 100,
        }
    }
}

/// Runtime-adjustable parameters addressed by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunable {
    AmplitudeThreshold,
    StrongRatioThreshold,
    WeakRatioThreshold,
    OnsetMultiplier,
    HistoryLength,
    ConfirmationDelayMs,
    CooldownMs,
}

impl Tunable {
    pub const ALL: [Tunable; 7] = [
        Tunable::AmplitudeThreshold,
        Tunable::StrongRatioThreshold,
        Tunable::WeakRatioThreshold,
        Tunable::OnsetMultiplier,
        Tunable::HistoryLength,
        Tunable::ConfirmationDelayMs,
        Tunable::CooldownMs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tunable::AmplitudeThreshold => "amplitude_threshold",
            Tunable::StrongRatioThreshold => "strong_ratio_threshold",
            Tunable::WeakRatioThreshold => "weak_ratio_threshold",
            Tunable::OnsetMultiplier => "onset_multiplier",
            Tunable::HistoryLength => "history_length",
            Tunable::ConfirmationDelayMs => "confirmation_delay_ms",
            Tunable::CooldownMs => "cooldown_ms",
        }
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tunable {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tunable::ALL
            .iter()
            .copied()
            .find(|tunable| tunable.name() == s)
            .ok_or_else(|| DetectorError::UnknownParameter {
                name: s.to_string(),
            })
    }
}

impl DetectorConfig {
    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The loaded configuration, sanitized. If the file doesn't exist or the
    /// JSON is invalid, a warning is logged and defaults are returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<DetectorConfig>(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config.sanitized()
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Clamp every value into the range the engine can work with
    pub fn sanitized(mut self) -> Self {
        let defaults = DetectorConfig::default();
        let c = &mut self.classifier;

        c.amplitude_threshold = if c.amplitude_threshold.is_finite() {
            c.amplitude_threshold
                .clamp(MIN_AMPLITUDE_THRESHOLD, MAX_AMPLITUDE_THRESHOLD)
        } else {
            defaults.classifier.amplitude_threshold
        };
        if !(c.strong_ratio_threshold.is_finite() && c.strong_ratio_threshold > 0.0) {
            c.strong_ratio_threshold = defaults.classifier.strong_ratio_threshold;
        }
        if !(c.weak_ratio_threshold.is_finite() && c.weak_ratio_threshold > 0.0) {
            c.weak_ratio_threshold = defaults.classifier.weak_ratio_threshold;
        }
        if !(c.onset_multiplier.is_finite() && c.onset_multiplier > 0.0) {
            c.onset_multiplier = defaults.classifier.onset_multiplier;
        }
        c.history_length = c.history_length.clamp(MIN_HISTORY_LENGTH, MAX_HISTORY_LENGTH);

        self.capture.frame_size = self.capture.frame_size.clamp(1, MAX_FRAME_SIZE);
        self.capture.buffer_pool_size = self.capture.buffer_pool_size.clamp(1, MAX_BUFFER_POOL_SIZE);
        self
    }

    /// Apply a single named parameter update
    ///
    /// Returns the value actually stored, which differs from `value` when
    /// it was clamped (amplitude threshold) or rounded (integer tunables).
    pub fn apply(&mut self, tunable: Tunable, value: f64) -> Result<f64, DetectorError> {
        let invalid = |reason: &str| DetectorError::InvalidValue {
            name: tunable.name().to_string(),
            value,
            reason: reason.to_string(),
        };

        if !value.is_finite() {
            return Err(invalid("must be a finite number"));
        }

        match tunable {
            Tunable::AmplitudeThreshold => {
                let clamped = (value as f32).clamp(MIN_AMPLITUDE_THRESHOLD, MAX_AMPLITUDE_THRESHOLD);
                self.classifier.amplitude_threshold = clamped;
                Ok(clamped as f64)
            }
            Tunable::StrongRatioThreshold
            | Tunable::WeakRatioThreshold
            | Tunable::OnsetMultiplier => {
                if value <= 0.0 {
                    return Err(invalid("must be greater than 0"));
                }
                let slot = match tunable {
                    Tunable::StrongRatioThreshold => &mut self.classifier.strong_ratio_threshold,
                    Tunable::WeakRatioThreshold => &mut self.classifier.weak_ratio_threshold,
                    _ => &mut self.classifier.onset_multiplier,
                };
                let stored = value as f32;
                if !stored.is_finite() {
                    return Err(invalid("out of range"));
                }
                *slot = stored;
                Ok(stored as f64)
            }
            Tunable::HistoryLength => {
                if value.fract() != 0.0
                    || value < MIN_HISTORY_LENGTH as f64
                    || value > MAX_HISTORY_LENGTH as f64
                {
                    return Err(invalid("must be a whole number of frames within 2..=1024"));
                }
                self.classifier.history_length = value as usize;
                Ok(value)
            }
            Tunable::ConfirmationDelayMs | Tunable::CooldownMs => {
                if value < 0.0 {
                    return Err(invalid("must not be negative"));
                }
                let millis = value.round() as u64;
                match tunable {
                    Tunable::ConfirmationDelayMs => self.debounce.confirmation_delay_ms = millis,
                    _ => self.debounce.cooldown_ms = millis,
                }
                Ok(millis as f64)
            }
        }
    }
}

/// Configuration shared between the caller, the capture thread and the gate
pub type SharedConfig = Arc<RwLock<DetectorConfig>>;

pub fn shared(config: DetectorConfig) -> SharedConfig {
    Arc::new(RwLock::new(config.sanitized()))
}

/// Read access that survives a writer panicking mid-update
///
/// Every field is a plain value, so a poisoned config is still consistent.
pub fn read_config(config: &SharedConfig) -> RwLockReadGuard<'_, DetectorConfig> {
    config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn write_config(config: &SharedConfig) -> RwLockWriteGuard<'_, DetectorConfig> {
    config.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
