//! Task — the unit of work submitted to the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The kind of work a [`Task`] represents. Closed set plus an escape hatch
/// for deployments that register bespoke agent kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Chat,
    Code,
    Vision,
    Reason,
    Route,
    Custom(String),
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Chat => write!(f, "chat"),
            TaskKind::Code => write!(f, "code"),
            TaskKind::Vision => write!(f, "vision"),
            TaskKind::Reason => write!(f, "reason"),
            TaskKind::Route => write!(f, "route"),
            TaskKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A unit of work submitted to the controller. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    /// The prompt text plus any structured fields the agent may want.
    pub payload: String,
    /// Open-ended context map; kept opaque to the controller itself.
    #[serde(default)]
    pub context: Map<String, Value>,
    pub requester_id: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(kind: TaskKind, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            payload: payload.into(),
            context: Map::new(),
            requester_id: None,
            deadline: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_requester(mut self, id: impl Into<String>) -> Self {
        self.requester_id = Some(id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The text used to query the semantic memory: the payload itself.
    pub fn query_text(&self) -> &str {
        &self.payload
    }
}
