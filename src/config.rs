//! Runtime configuration.
//!
//! Every option enumerated in the controller's external-interface contract,
//! deserializable from YAML or JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_memories: usize,
    pub similarity_threshold: f32,
    pub dedup_threshold: f32,
    pub confidence_threshold_default: f32,
    pub alert_threshold_consecutive_failures: u32,
    pub stale_after_secs: u64,
    pub health_check_interval_secs: u64,
    pub dispatch_deadline_secs: u64,
    pub heal_deadline_secs: u64,
    pub per_agent_concurrency: usize,
    pub budget_global_limit: f64,
    pub budget_per_provider: HashMap<String, f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_memories: 1000,
            similarity_threshold: 0.75,
            dedup_threshold: 0.90,
            confidence_threshold_default: 0.85,
            alert_threshold_consecutive_failures: 3,
            stale_after_secs: 5 * 60,
            health_check_interval_secs: 30,
            dispatch_deadline_secs: 30,
            heal_deadline_secs: 10,
            per_agent_concurrency: 5,
            budget_global_limit: 0.0,
            budget_per_provider: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(s: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let c = RuntimeConfig::default();
        assert_eq!(c.max_memories, 1000);
        assert_eq!(c.similarity_threshold, 0.75);
        assert_eq!(c.dedup_threshold, 0.90);
        assert_eq!(c.confidence_threshold_default, 0.85);
        assert_eq!(c.alert_threshold_consecutive_failures, 3);
        assert_eq!(c.per_agent_concurrency, 5);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let c = RuntimeConfig::from_yaml("max_memories: 50\n").unwrap();
        assert_eq!(c.max_memories, 50);
        assert_eq!(c.similarity_threshold, 0.75);
    }
}
