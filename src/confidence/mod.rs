//! Confidence Gate (CG).
//!
//! Reduces an [`AgentResponse`] to a scalar confidence in `[0, 1]` and
//! decides whether to escalate. Deterministic given the same inputs.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::agent::AgentResponse;
use crate::task::TaskKind;

const HEDGING_MARKERS: &[&str] = &[
    "i don't know",
    "i'm not sure",
    "might be",
    "possibly",
    "unclear",
];

/// Per-task-kind adjustments to the scoring rubric. Only the patterns that
/// contribute to the completeness/hedging signals change; normalisation and
/// clamping stay fixed.
struct RubricOverrides {
    extra_negative_markers: &'static [&'static str],
}

fn rubric_for(kind: &TaskKind) -> RubricOverrides {
    match kind {
        TaskKind::Code => RubricOverrides {
            extra_negative_markers: &["todo", "unimplemented!", "<result>", "<value>", "placeholder"],
        },
        _ => RubricOverrides { extra_negative_markers: &[] },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceEvaluation {
    pub score: f32,
    pub threshold: f32,
    pub should_escalate: bool,
    pub factors: HashMap<String, f32>,
}

pub struct ConfidenceGate {
    base_score: f32,
    history: Mutex<VecDeque<ConfidenceEvaluation>>,
    total_requests: std::sync::atomic::AtomicU64,
    escalations: std::sync::atomic::AtomicU64,
    api_calls: std::sync::atomic::AtomicU64,
}

impl ConfidenceGate {
    pub fn new() -> Self {
        Self {
            base_score: 0.5,
            history: Mutex::new(VecDeque::with_capacity(1000)),
            total_requests: std::sync::atomic::AtomicU64::new(0),
            escalations: std::sync::atomic::AtomicU64::new(0),
            api_calls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn with_base_score(mut self, base: f32) -> Self {
        self.base_score = base.clamp(0.0, 1.0);
        self
    }

    /// Evaluate `response` against `threshold`, applying the rubric for
    /// `kind`. Never mutates `response`.
    pub fn evaluate(&self, response: &AgentResponse, kind: &TaskKind, threshold: f32) -> ConfidenceEvaluation {
        self.total_requests.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let rubric = rubric_for(kind);
        let mut factors = HashMap::new();
        let mut score = self.base_score;

        if let Some(logprobs) = &response.logprobs {
            if !logprobs.is_empty() {
                let mean: f32 = logprobs.iter().sum::<f32>() / logprobs.len() as f32;
                let contribution = 0.40 * mean.exp().clamp(0.0, 1.0);
                factors.insert("logprob".to_string(), contribution);
                score += contribution;
            }
        }

        if response.content.len() > 50 {
            factors.insert("completeness".to_string(), 0.20);
            score += 0.20;
        }

        let lower = response.content.to_lowercase();
        let hedged = response.error_kind.is_some()
            || HEDGING_MARKERS.iter().any(|m| lower.contains(m))
            || rubric.extra_negative_markers.iter().any(|m| lower.contains(m));
        if !hedged {
            factors.insert("hedging".to_string(), 0.20);
            score += 0.20;
        }

        if response.execution_time_ms < 5000 {
            factors.insert("latency".to_string(), 0.10);
            score += 0.10;
        }

        let is_reasoning_model = response.model.contains("reason") || response.model.contains("r1");
        if is_reasoning_model && response.content.contains("<think>") {
            factors.insert("model_bonus".to_string(), 0.10);
            score += 0.10;
        }

        let score = score.clamp(0.0, 1.0);
        let should_escalate = score < threshold;

        let evaluation = ConfidenceEvaluation { score, threshold, should_escalate, factors };

        if should_escalate {
            self.escalations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut history = self.history.lock().expect("confidence history lock poisoned");
            if history.len() >= 1000 {
                history.pop_front();
            }
            history.push_back(evaluation.clone());
        }

        evaluation
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn escalation_count(&self) -> u64 {
        self.escalations.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn api_call_count(&self) -> u64 {
        self.api_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_clean_response(exec_ms: u64) -> AgentResponse {
        AgentResponse::new(
            "a".repeat(120),
            "llama3.2:3b",
            exec_ms,
        )
    }

    #[test]
    fn happy_path_response_scores_above_default_threshold() {
        let cg = ConfidenceGate::new();
        let response = long_clean_response(1000);
        let eval = cg.evaluate(&response, &TaskKind::Chat, 0.85);
        assert!(!eval.should_escalate, "score was {}", eval.score);
    }

    #[test]
    fn short_hedged_response_escalates() {
        let cg = ConfidenceGate::new();
        let response = AgentResponse::new("I'm not sure", "llama3.2:3b", 1000);
        let eval = cg.evaluate(&response, &TaskKind::Chat, 0.85);
        assert!(eval.should_escalate);
        assert!(eval.score < 0.85);
    }

    #[test]
    fn code_rubric_penalizes_placeholders() {
        let cg = ConfidenceGate::new();
        let response = AgentResponse::new("a".repeat(120) + " <result> TODO", "qwen2.5-coder:7b", 1000);
        let eval = cg.evaluate(&response, &TaskKind::Code, 0.90);
        assert!(eval.should_escalate);
    }

    #[test]
    fn score_is_always_clamped() {
        let cg = ConfidenceGate::new().with_base_score(1.0);
        let response = long_clean_response(100);
        let eval = cg.evaluate(&response, &TaskKind::Chat, 0.85);
        assert!(eval.score <= 1.0);
    }

    #[test]
    fn escalation_monotonicity_holds_for_equal_inputs() {
        let cg = ConfidenceGate::new();
        let better = long_clean_response(1000);
        let worse = AgentResponse::new("short", "llama3.2:3b", 1000);
        let e_better = cg.evaluate(&better, &TaskKind::Chat, 0.85);
        let e_worse = cg.evaluate(&worse, &TaskKind::Chat, 0.85);
        assert!(e_better.score >= e_worse.score);
        if e_better.should_escalate {
            assert!(e_worse.should_escalate);
        }
    }

    #[test]
    fn history_is_bounded_to_1000() {
        let cg = ConfidenceGate::new();
        let escalating = AgentResponse::new("possibly", "m", 1000);
        for _ in 0..1100 {
            cg.evaluate(&escalating, &TaskKind::Chat, 0.99);
        }
        assert_eq!(cg.history.lock().unwrap().len(), 1000);
    }
}
