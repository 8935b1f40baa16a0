//! Metric event types describing detector internals for CLI reporting and
//! diagnostics subscribers.

use serde::{Deserialize, Serialize};

use crate::analysis::Classification;

/// Lifecycle stages of the detector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    Stopped,
    StartFailed,
}

/// Metric events covering frame levels, gate transitions and lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Periodic frame level sample
    FrameLevels {
        frame_index: u64,
        rms: f32,
        peak: f32,
        ratio: f32,
        background: f32,
    },
    /// Non-neutral classification
    Classification {
        frame_index: u64,
        classification: Classification,
        rms: f32,
        ratio: f32,
    },
    ConfirmationArmed {
        /// True when an earlier pending confirmation was superseded
        restarted: bool,
        delay_ms: u64,
    },
    /// Strong onset dropped during the cooldown window
    ClapIgnored {
        cooldown_remaining_ms: u64,
        /// True when a pending confirmation was cancelled as well
        cancelled_pending: bool,
    },
    ConfirmationCancelled,
    ClapConfirmed {
        timestamp_ms: u64,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
}
