//! Agent descriptor — the controller's record of a registered agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::task::TaskKind;

/// Health/dispatch status of an agent, maintained exclusively by the
/// Health Supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Ready,
    Busy,
    Degraded,
    Critical,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub display_name: String,
    pub kind: TaskKind,
    pub capabilities: HashSet<String>,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub confidence_threshold: f32,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            kind,
            capabilities: HashSet::new(),
            primary_model: "default".to_string(),
            fallback_model: None,
            confidence_threshold: 0.85,
            status: AgentStatus::Ready,
            last_heartbeat: Utc::now(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = String>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn can_dispatch(&self) -> bool {
        self.status != AgentStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_status_cannot_dispatch() {
        let mut d = AgentDescriptor::new("a", TaskKind::Chat);
        assert!(d.can_dispatch());
        d.status = AgentStatus::Failed;
        assert!(!d.can_dispatch());
    }

    #[test]
    fn critical_status_can_still_dispatch() {
        let mut d = AgentDescriptor::new("a", TaskKind::Chat);
        d.status = AgentStatus::Critical;
        assert!(d.can_dispatch());
    }
}
