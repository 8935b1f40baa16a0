//! Detector output events and the sinks that receive them.
//!
//! Events are delivered from the capture thread (weak claps) or the timer
//! runtime (confirmed claps). Sinks must not block; move heavy work to a task
//! fed through a channel sink.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// Event emitted to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClapEvent {
    /// Clap-like but soft sound; forwarded immediately, never confirmed
    Weak,
    /// Strong clap that survived the confirmation window
    Confirmed,
}

impl fmt::Display for ClapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClapEvent::Weak => write!(f, "weak clap"),
            ClapEvent::Confirmed => write!(f, "clap confirmed"),
        }
    }
}

/// Receives detector events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClapEvent);
}

impl EventSink for broadcast::Sender<ClapEvent> {
    fn emit(&self, event: ClapEvent) {
        // No receivers is fine: nobody is listening yet
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::UnboundedSender<ClapEvent> {
    fn emit(&self, event: ClapEvent) {
        if self.send(event).is_err() {
            tracing::debug!("[EventSink] Receiver dropped, discarding {}", event);
        }
    }
}

type Callback = Box<dyn Fn() + Send + Sync>;

/// Closure-based sink with one optional callback per event kind
#[derive(Default)]
pub struct ClapCallbacks {
    on_confirmed: Option<Callback>,
    on_weak: Option<Callback>,
}

impl ClapCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_clap_confirmed(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_confirmed = Some(Box::new(callback));
        self
    }

    pub fn on_weak_clap(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_weak = Some(Box::new(callback));
        self
    }
}

impl EventSink for ClapCallbacks {
    fn emit(&self, event: ClapEvent) {
        let callback = match event {
            ClapEvent::Confirmed => self.on_confirmed.as_ref(),
            ClapEvent::Weak => self.on_weak.as_ref(),
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Delivers every event to each inner sink in registration order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: ClapEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
