// OnsetClassifier - adaptive-threshold clap onset classification
//
// A single loud frame is not enough evidence of a clap: speech and music spike
// RMS too. Two conditions must hold together:
//
// 1. ONSET: current RMS exceeds the trailing background by `onset_multiplier`
//    and clears the absolute `amplitude_threshold`. The background adapts to
//    the room, so a permanently loud environment does not trigger.
// 2. TRANSIENT: the frame's peak/RMS ratio is high. A clap attack is one sharp
//    peak over modest energy; sustained sounds keep the ratio low.
//
// Algorithm per frame (arrival order matters, background is a trailing value):
// 1. Append current RMS to the history (evicting the oldest)
// 2. background = mean of the history without the value just appended, once
//    the history is full; otherwise background = current (cold start)
// 3. onset = current > background * multiplier && current > amplitude floor
// 4. Strong if onset && ratio > strong; Weak if onset && weak < ratio <= strong

use serde::{Deserialize, Serialize};

use super::frame::FrameStatistics;
use super::history::EnergyHistory;
use crate::config::{ClassifierConfig, MAX_HISTORY_LENGTH, MIN_HISTORY_LENGTH};

/// Three-way per-frame classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// No clap-like onset
    None,
    /// Onset with a clap-like but soft transient
    Weak,
    /// Onset with a sharp clap transient
    Strong,
}

/// Classification plus the intermediate values it was derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetDecision {
    pub classification: Classification,
    /// RMS of the classified frame
    pub current: f32,
    /// Trailing background energy the frame was compared against
    pub background: f32,
    /// Peak/RMS ratio of the classified frame
    pub ratio: f32,
    /// Whether the energy onset condition held
    pub onset: bool,
}

impl OnsetDecision {
    /// current / background, guarded against a silent background
    pub fn onset_ratio(&self) -> f32 {
        self.current / self.background.max(0.0001)
    }
}

/// Stateful onset classifier owning the energy history
#[derive(Debug, Clone)]
pub struct OnsetClassifier {
    history: EnergyHistory,
}

impl OnsetClassifier {
    pub fn new(history_length: usize) -> Self {
        Self {
            history: EnergyHistory::new(
                history_length.clamp(MIN_HISTORY_LENGTH, MAX_HISTORY_LENGTH),
            ),
        }
    }

    pub fn with_config(config: &ClassifierConfig) -> Self {
        Self::new(config.history_length)
    }

    /// Classify one frame and record its energy
    ///
    /// `config` is read fresh on every call, so parameter changes apply from
    /// the next frame on.
    pub fn classify(&mut self, stats: &FrameStatistics, config: &ClassifierConfig) -> OnsetDecision {
        let capacity = config.history_length.clamp(MIN_HISTORY_LENGTH, MAX_HISTORY_LENGTH);
        if capacity != self.history.capacity() {
            self.history.resize(capacity);
        }

        let current = stats.rms;
        self.history.push(current);

        let background = if self.history.is_full() {
            self.history.mean_excluding_newest().unwrap_or(current)
        } else {
            current
        };

        let onset = current > background * config.onset_multiplier
            && current > config.amplitude_threshold;

        let ratio_strong = stats.ratio > config.strong_ratio_threshold;
        let ratio_weak = stats.ratio > config.weak_ratio_threshold && !ratio_strong;

        let classification = if onset && ratio_strong {
            Classification::Strong
        } else if onset && ratio_weak {
            Classification::Weak
        } else {
            Classification::None
        };

        OnsetDecision {
            classification,
            current,
            background,
            ratio: stats.ratio,
            onset,
        }
    }

    /// Forget all recorded energy (cold start)
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }
}

impl Default for OnsetClassifier {
    fn default() -> Self {
        Self::with_config(&ClassifierConfig::default())
    }
}
