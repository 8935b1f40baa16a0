//! Diagnostics telemetry collector.
//!
//! The collector multiplexes frame levels, classifications, and gate
//! transitions into a bounded history plus an async broadcast stream. Each
//! detector owns its own collector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;

use crate::analysis::{Classification, FrameStatistics, OnsetDecision};

pub mod events;

pub use events::{LifecyclePhase, MetricEvent};

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

impl TelemetrySnapshot {
    /// Count retained events matching a predicate
    pub fn count(&self, predicate: impl Fn(&MetricEvent) -> bool) -> usize {
        self.recent.iter().filter(|event| predicate(event)).count()
    }
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<MetricEvent>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if self.history_capacity > 0 {
            let mut history = self.lock_history();
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.lock_history();
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }

    pub fn record_frame_levels(
        &self,
        frame_index: u64,
        stats: &FrameStatistics,
        decision: &OnsetDecision,
    ) {
        self.publish(MetricEvent::FrameLevels {
            frame_index,
            rms: stats.rms,
            peak: stats.peak,
            ratio: stats.ratio,
            background: decision.background,
        });
    }

    pub fn record_classification(&self, frame_index: u64, decision: &OnsetDecision) {
        if decision.classification == Classification::None {
            return;
        }
        self.publish(MetricEvent::Classification {
            frame_index,
            classification: decision.classification,
            rms: decision.current,
            ratio: decision.ratio,
        });
    }

    pub fn record_armed(&self, restarted: bool, delay: Duration) {
        self.publish(MetricEvent::ConfirmationArmed {
            restarted,
            delay_ms: delay.as_millis() as u64,
        });
    }

    pub fn record_ignored(&self, remaining: Duration, cancelled_pending: bool) {
        self.publish(MetricEvent::ClapIgnored {
            cooldown_remaining_ms: remaining.as_millis() as u64,
            cancelled_pending,
        });
    }

    pub fn record_cancelled(&self) {
        self.publish(MetricEvent::ConfirmationCancelled);
    }

    pub fn record_confirmed(&self) {
        self.publish(MetricEvent::ClapConfirmed {
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        self.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(classification: Classification) -> OnsetDecision {
        OnsetDecision {
            classification,
            current: 0.2,
            background: 0.01,
            ratio: 6.0,
            onset: true,
        }
    }

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.record_armed(false, Duration::from_millis(300));
        collector.record_cancelled();
        collector.record_confirmed();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::ConfirmationArmed {
                restarted: false,
                delay_ms: 300
            }
        ));
        assert!(matches!(
            snapshot.recent[2],
            MetricEvent::ClapConfirmed { .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        collector.record_armed(false, Duration::from_millis(300));
        collector.record_armed(true, Duration::from_millis(300));
        collector.record_cancelled();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::ConfirmationArmed { restarted: true, .. }
        ));
    }

    #[test]
    fn neutral_classification_is_not_recorded() {
        let collector = TelemetryCollector::default();
        collector.record_classification(1, &decision(Classification::None));
        collector.record_classification(2, &decision(Classification::Weak));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_events, 1);
        assert_eq!(
            snapshot.count(|event| matches!(
                event,
                MetricEvent::Classification {
                    classification: Classification::Weak,
                    ..
                }
            )),
            1
        );
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let collector = TelemetryCollector::default();
        let mut rx = collector.subscribe();
        collector.record_lifecycle(LifecyclePhase::Started);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            MetricEvent::Lifecycle {
                phase: LifecyclePhase::Started,
                ..
            }
        ));
    }

    #[test]
    fn metric_events_serialize_with_type_tag() {
        let json = serde_json::to_string(&MetricEvent::ClapIgnored {
            cooldown_remaining_ms: 1200,
            cancelled_pending: false,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"clap_ignored\""));
        assert!(json.contains("\"cooldown_remaining_ms\":1200"));
    }
}
