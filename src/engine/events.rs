use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::backend::TimeSource;

/// Event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub timestamp_ms: u64,
    pub kind: EngineEventKind,
    pub detail: Option<String>,
}

/// Types of events the engine publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEventKind {
    Started { bpm: u32 },
    Stopped,
    MeasureCompleted { measure: u64 },
    BpmChanged { bpm: u32 },
    Warning,
}

/// Cloneable sender half used by the engine and its scheduler thread.
#[derive(Clone)]
pub(crate) struct EventPublisher {
    tx: broadcast::Sender<EngineEvent>,
    time_source: Arc<dyn TimeSource>,
}

impl EventPublisher {
    pub(crate) fn new(capacity: usize, time_source: Arc<dyn TimeSource>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, time_source }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time_source
    }

    /// Publish an event. Having no subscribers is not an error.
    pub(crate) fn publish(&self, kind: EngineEventKind, detail: Option<String>) {
        let timestamp_ms = self.time_source.now_ms().max(0.0) as u64;
        let _ = self.tx.send(EngineEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }
}
