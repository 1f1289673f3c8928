//! Memory record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A persisted (query, response) pair indexed by embedding similarity and
/// ranked by a relevance+access score used for eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub relevance_score: f32,
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(agent_id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            content: content.into(),
            embedding,
            metadata: Map::new(),
            relevance_score: 0.5,
            access_count: 0,
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// `0.7 * relevanceScore + 0.3 * (accessCount / 100)`, the composite
    /// score used to rank eviction candidates (lowest evicted first).
    pub fn composite_score(&self) -> f32 {
        0.7 * self.relevance_score + 0.3 * (self.access_count as f32 / 100.0)
    }
}
