//! Agent response — the immutable output of one dispatch.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Unavailable,
    Internal,
    InvalidInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    pub model: String,
    pub execution_time_ms: u64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    /// Per-token log-probabilities, if the provider exposes them.
    pub logprobs: Option<Vec<f32>>,
    pub error_kind: Option<ErrorKind>,

    // Escalation annotations, set by the AEC after dispatch completes.
    #[serde(default)]
    pub escalated: bool,
    #[serde(default)]
    pub original_confidence: Option<f32>,
    #[serde(default)]
    pub escalation_attempted: bool,
    #[serde(default)]
    pub escalation_failed: bool,
    #[serde(default)]
    pub escalation_failure_reason: Option<String>,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            execution_time_ms,
            tokens_in: None,
            tokens_out: None,
            logprobs: None,
            error_kind: None,
            escalated: false,
            original_confidence: None,
            escalation_attempted: false,
            escalation_failed: false,
            escalation_failure_reason: None,
        }
    }

    pub fn with_logprobs(mut self, logprobs: Vec<f32>) -> Self {
        self.logprobs = Some(logprobs);
        self
    }

    pub fn with_tokens(mut self, tokens_in: u32, tokens_out: u32) -> Self {
        self.tokens_in = Some(tokens_in);
        self.tokens_out = Some(tokens_out);
        self
    }

    pub fn mark_escalated(&mut self, original_confidence: f32) {
        self.escalated = true;
        self.original_confidence = Some(original_confidence);
    }

    pub fn mark_escalation_failed(&mut self, reason: impl Into<String>) {
        self.escalation_attempted = true;
        self.escalation_failed = true;
        self.escalation_failure_reason = Some(reason.into());
    }
}
