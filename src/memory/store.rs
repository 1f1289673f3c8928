//! Semantic memory store.
//!
//! Per-agent associative store of past interactions. Lossy but monotonically
//! improving under use: every retrieval nudges relevance up, eviction removes
//! the lowest-scored records first, and near-duplicate stores merge into the
//! existing record instead of growing the table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::embedder::{cosine_similarity, Embedder, LexicalEmbedder};
use super::entry::MemoryRecord;

/// A record together with the similarity it scored against a query.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub similarity: f32,
}

/// Per-agent shard: a single logical lock per agent id. Retrieval takes a
/// write lock too since it mutates access bookkeeping on every hit.
struct Shard {
    records: RwLock<Vec<MemoryRecord>>,
}

impl Shard {
    fn new() -> Self {
        Self { records: RwLock::new(Vec::new()) }
    }
}

pub struct SemanticMemory {
    embedder: Arc<dyn Embedder>,
    shards: RwLock<HashMap<String, Arc<Shard>>>,
    max_memories: usize,
    similarity_threshold: f32,
    dedup_threshold: f32,
    path: Option<PathBuf>,
}

impl SemanticMemory {
    pub fn new(max_memories: usize, similarity_threshold: f32, dedup_threshold: f32) -> Self {
        Self {
            embedder: Arc::new(LexicalEmbedder::new()),
            shards: RwLock::new(HashMap::new()),
            max_memories,
            similarity_threshold,
            dedup_threshold,
            path: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Load from / persist to a JSON file at `path` (serde_json document
    /// containing the flattened list of records across all agents).
    pub async fn with_persistence(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let records: Vec<MemoryRecord> = serde_json::from_str(&content)?;
            let mut shards = self.shards.write().await;
            for record in records {
                let shard = shards
                    .entry(record.agent_id.clone())
                    .or_insert_with(|| Arc::new(Shard::new()));
                shard.records.write().await.push(record);
            }
            info!("Loaded semantic memory from {:?}", path);
        }
        self.path = Some(path);
        Ok(self)
    }

    async fn shard_for(&self, agent_id: &str) -> Arc<Shard> {
        {
            let shards = self.shards.read().await;
            if let Some(shard) = shards.get(agent_id) {
                return shard.clone();
            }
        }
        let mut shards = self.shards.write().await;
        shards
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Shard::new()))
            .clone()
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let shards = self.shards.read().await;
        let mut all = Vec::new();
        for shard in shards.values() {
            all.extend(shard.records.read().await.iter().cloned());
        }
        let content = serde_json::to_string_pretty(&all)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Store `content` for `agent_id`. If an existing record of the same
    /// agent has similarity >= dedup_threshold, its relevance score is
    /// bumped instead of inserting a duplicate. Returns the stored (or
    /// updated) record's id.
    pub async fn store(
        &self,
        agent_id: &str,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let embedding = self.embedder.embed(content);
        let shard = self.shard_for(agent_id).await;
        let mut records = shard.records.write().await;

        if let Some(existing) = records
            .iter_mut()
            .find(|r| cosine_similarity(&r.embedding, &embedding) >= self.dedup_threshold)
        {
            existing.relevance_score = (existing.relevance_score + 0.05).min(1.0);
            let id = existing.id.clone();
            debug!("Deduplicated store into existing record {}", id);
            drop(records);
            self.persist().await?;
            return Ok(id);
        }

        let record = MemoryRecord::new(agent_id, content, embedding).with_metadata(metadata);
        let id = record.id.clone();
        records.push(record);

        if records.len() > self.max_memories {
            let evict_count = (records.len() as f32 * 0.10).ceil() as usize;
            records.sort_by(|a, b| {
                a.composite_score()
                    .partial_cmp(&b.composite_score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            records.drain(0..evict_count.min(records.len().saturating_sub(1)));
        }

        drop(records);
        self.persist().await?;
        Ok(id)
    }

    /// Retrieve up to `k` records for `agent_id` with similarity at or above
    /// the configured threshold, sorted descending by similarity. Bumps
    /// access_count/last_accessed_at/relevance_score on every hit returned.
    pub async fn retrieve(&self, agent_id: &str, query: &str, k: usize) -> Result<Vec<ScoredRecord>> {
        self.find_similar(agent_id, query, self.similarity_threshold, k).await
    }

    /// Same as `retrieve` but with a caller-supplied threshold; used
    /// internally for dedup probing and exposed for callers that want a
    /// different cutoff than the configured default.
    pub async fn find_similar(
        &self,
        agent_id: &str,
        query: &str,
        threshold: f32,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let query_embedding = self.embedder.embed(query);
        let shard = self.shard_for(agent_id).await;
        let mut records = shard.records.write().await;

        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (idx, cosine_similarity(&r.embedding, &query_embedding)))
            .filter(|(_, sim)| *sim >= threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let now = chrono::Utc::now();
        let mut out = Vec::with_capacity(scored.len());
        for (idx, similarity) in scored {
            let rec = &mut records[idx];
            rec.access_count += 1;
            rec.last_accessed_at = now;
            rec.relevance_score = (rec.relevance_score + 0.01).min(1.0);
            out.push(ScoredRecord { record: rec.clone(), similarity });
        }
        drop(records);
        self.persist().await?;
        Ok(out)
    }

    pub async fn count(&self, agent_id: &str) -> usize {
        let shard = self.shard_for(agent_id).await;
        shard.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn store_then_retrieve_returns_exact_match_as_top_hit() {
        let mem = SemanticMemory::new(1000, 0.75, 0.90);
        mem.store("agentA", "how do I reset a password", Map::new()).await.unwrap();
        let hits = mem.retrieve("agentA", "how do I reset a password", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn dedup_updates_relevance_instead_of_inserting() {
        let mem = SemanticMemory::new(1000, 0.75, 0.90);
        mem.store("a", "reset my password please", Map::new()).await.unwrap();
        // Second store of the same content should merge, not insert.
        mem.store("a", "reset my password please", Map::new()).await.unwrap();
        assert_eq!(mem.count("a").await, 1);
        let hits = mem.find_similar("a", "reset my password please", 0.0, 1).await.unwrap();
        // Default relevance is 0.5; dedup bumps it by 0.05 strictly above the default.
        assert!(hits[0].record.relevance_score > 0.5);
    }

    #[tokio::test]
    async fn eviction_caps_records_per_agent() {
        let mem = SemanticMemory::new(10, 0.0, 0.90);
        for i in 0..30 {
            mem.store("a", &format!("distinct unrelated content number {i} xyz"), Map::new())
                .await
                .unwrap();
        }
        assert!(mem.count("a").await <= 10);
    }

    #[tokio::test]
    async fn retrieval_across_agents_does_not_interfere() {
        let mem = SemanticMemory::new(1000, 0.75, 0.90);
        mem.store("agentA", "unique topic about databases", Map::new()).await.unwrap();
        mem.store("agentB", "unique topic about databases", Map::new()).await.unwrap();
        assert_eq!(mem.count("agentA").await, 1);
        assert_eq!(mem.count("agentB").await, 1);
    }

    #[tokio::test]
    async fn records_stored_before_reload_are_retrievable_after() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let mem = SemanticMemory::new(1000, 0.75, 0.90).with_persistence(&path).await.unwrap();
        mem.store("agentA", "how do I rotate a database credential", Map::new()).await.unwrap();

        let reloaded = SemanticMemory::new(1000, 0.75, 0.90).with_persistence(&path).await.unwrap();
        let hits = reloaded.retrieve("agentA", "how do I rotate a database credential", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_stores_do_not_exceed_cap() {
        let mem = Arc::new(SemanticMemory::new(100, 0.0, 0.90));
        let mut handles = Vec::new();
        for i in 0..200 {
            let mem = mem.clone();
            handles.push(tokio::spawn(async move {
                mem.store("a", &format!("content item {i} unique filler words here"), Map::new())
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(mem.count("a").await <= 100);
    }
}
