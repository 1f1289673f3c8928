//! Router — the advisory orchestrator that classifies a task's target
//! agent kind.
//!
//! Two-tier strategy: fast keyword heuristics short-circuit the common
//! cases, falling back to an injected [`AgentHandler`] used purely for
//! classification when nothing matches. The routing result is advisory;
//! final dispatch still goes through
//! [`crate::orchestrator::aec::AgentExecutionController::execute`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::handler::{AgentHandler, EnrichedContext};
use crate::task::{Task, TaskKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub agent_id: String,
    pub confidence: f32,
    pub reason: String,
    pub should_search_memory: bool,
}

pub struct Router {
    classifier: Option<Arc<dyn AgentHandler>>,
    default_agent_id: String,
}

impl Router {
    pub fn new(default_agent_id: impl Into<String>) -> Self {
        Self { classifier: None, default_agent_id: default_agent_id.into() }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn AgentHandler>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Route `task` to a target agent id, consulting fast heuristics first.
    pub async fn route(&self, task: &Task) -> RoutingDecision {
        let q_lower = task.payload.to_lowercase();

        if q_lower.len() < 10 || self.is_greeting(&q_lower) || self.is_identity_query(&q_lower) {
            return RoutingDecision {
                agent_id: "general_chat".to_string(),
                confidence: 0.9,
                reason: "short message, greeting, or identity query".to_string(),
                should_search_memory: false,
            };
        }

        if self.is_filesystem_related(&q_lower) {
            return RoutingDecision {
                agent_id: "coder".to_string(),
                confidence: 0.95,
                reason: "direct filesystem query (heuristics fast-path)".to_string(),
                should_search_memory: false,
            };
        }

        if matches!(task.kind, TaskKind::Code) && self.is_code_related(&q_lower) && !self.is_complex_query(&q_lower) {
            return RoutingDecision {
                agent_id: "coder".to_string(),
                confidence: 0.85,
                reason: "query contains code-related keywords".to_string(),
                should_search_memory: false,
            };
        }

        if self.is_planning_related(&q_lower) || self.is_complex_query(&q_lower) {
            return RoutingDecision {
                agent_id: "planner".to_string(),
                confidence: 0.8,
                reason: "query involves planning or task decomposition".to_string(),
                should_search_memory: true,
            };
        }

        if self.is_research_related(&q_lower) {
            return RoutingDecision {
                agent_id: "researcher".to_string(),
                confidence: 0.8,
                reason: "query requires information gathering".to_string(),
                should_search_memory: true,
            };
        }

        if let Some(classifier) = &self.classifier {
            if let Ok(response) = classifier.invoke(task, &EnrichedContext::empty()).await {
                return RoutingDecision {
                    agent_id: response.content.trim().to_lowercase(),
                    confidence: 0.7,
                    reason: "classifier routing decision".to_string(),
                    should_search_memory: true,
                };
            }
        }

        RoutingDecision {
            agent_id: self.default_agent_id.clone(),
            confidence: 0.5,
            reason: "no heuristic matched; default agent".to_string(),
            should_search_memory: true,
        }
    }

    fn is_greeting(&self, query: &str) -> bool {
        let greetings = ["hi", "hello", "hey", "howdy", "greetings", "good morning", "good afternoon", "good evening"];
        greetings.iter().any(|g| query.starts_with(g) || query == *g)
    }

    fn is_identity_query(&self, query: &str) -> bool {
        let keywords = ["who are you", "what is your name", "what are you", "your identity", "your name"];
        keywords.iter().any(|k| query.contains(k))
    }

    fn is_filesystem_related(&self, query: &str) -> bool {
        let keywords = [
            "list", "folder", "directory", "file", "ls", "dir", "tree", "structure",
            "show files", "show folders", "what is in", "contents of", "read ",
        ];
        keywords.iter().any(|k| query.contains(k))
    }

    fn is_code_related(&self, query: &str) -> bool {
        let keywords = [
            "code", "function", "program", "script", "bug", "error", "compile",
            "debug", "implement", "algorithm", "class", "method", "variable",
            "rust", "python", "javascript", "typescript", "java", "c++", "golang",
            "write a", "create a", "fix the", "refactor",
        ];
        keywords.iter().any(|k| query.contains(k))
    }

    fn is_planning_related(&self, query: &str) -> bool {
        let keywords = [
            "plan", "schedule", "steps", "how to", "break down", "organize",
            "roadmap", "workflow", "process", "strategy", "goal", "milestone",
        ];
        keywords.iter().any(|k| query.contains(k))
    }

    fn is_research_related(&self, query: &str) -> bool {
        let keywords = [
            "search", "find", "look up", "research", "what is", "who is",
            "when did", "where is", "why does", "how does", "latest", "current",
            "news", "information about", "tell me about",
        ];
        keywords.iter().any(|k| query.contains(k))
    }

    fn is_complex_query(&self, query: &str) -> bool {
        query.contains(" and ") || query.contains(" then ") || query.contains(", then ") || query.contains(" and finally ")
    }
}

/// Tie-break rule: prefer higher confidence, then fewer
/// `consecutive_failures`, then lexicographically smallest agent id.
pub fn tie_break<'a>(candidates: &'a [(String, f32, u32)]) -> Option<&'a str> {
    candidates
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| b.0.cmp(&a.0))
        })
        .map(|(id, _, _)| id.as_str())
}
