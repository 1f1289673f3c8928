//! Internal event bus.
//!
//! A centralized, asynchronous pub/sub system for cross-component
//! telemetry, scoped to the events the controller's external interface
//! actually promises to emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemAlertKind {
    HighErrorRate,
    HighMemoryUsage,
}

/// Events the controller emits over its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AecEvent {
    EscalationTriggered { agent_id: String, score: f32, threshold: f32 },
    EscalationCompleted { agent_id: String },
    EscalationFailed { agent_id: String, reason: String },
    AgentDegraded { agent_id: String, consecutive_failures: u32 },
    AgentCritical { agent_id: String, consecutive_failures: u32 },
    AgentRecovered { agent_id: String },
    AgentRestarted { agent_id: String, success: bool },
    AgentRestartFailed { agent_id: String },
    SystemAlert { kind: SystemAlertKind, detail: String },
}

/// An [`AecEvent`] tagged with a monotonic sequence number and wall-clock
/// timestamp, as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub event_seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: AecEvent,
}

pub struct EventBus {
    tx: broadcast::Sender<TimestampedEvent>,
    seq: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx, seq: std::sync::atomic::AtomicU64::new(0) }
    }

    /// Publish an event to all subscribers. Never blocks; if there are no
    /// subscribers the event is simply dropped.
    pub fn publish(&self, event: AecEvent) {
        let seq = self.seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let _ = self.tx.send(TimestampedEvent { event_seq: seq, timestamp: Utc::now(), event });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
