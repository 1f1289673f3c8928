//! Error taxonomy for the Agent Execution Controller.
//!
//! Mirrors the closed taxonomy the controller promises callers:
//! `invalidInput`, `unavailable`, `timeout`, `internal`, `escalationFailed`.

use thiserror::Error;

/// Errors surfaced at the AEC boundary.
#[derive(Debug, Error)]
pub enum AecError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("agent unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// The primary response is still returned to the caller; this variant
    /// exists so callers that want to distinguish the case can match on it.
    #[error("escalation failed, primary response returned")]
    EscalationFailed,
}

impl AecError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AecError::Timeout | AecError::Internal(_))
    }
}

/// Errors a registered [`crate::agent::AgentHandler`] may fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler timed out")]
    Timeout,
    #[error("handler unavailable")]
    Unavailable,
    #[error("handler internal error: {0}")]
    Internal(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<HandlerError> for AecError {
    fn from(e: HandlerError) -> Self {
        match e {
            HandlerError::Timeout => AecError::Timeout,
            HandlerError::Unavailable => AecError::Unavailable("handler reported unavailable".into()),
            HandlerError::Internal(msg) => AecError::Internal(anyhow::anyhow!(msg)),
            HandlerError::InvalidInput(msg) => AecError::InvalidInput(msg),
        }
    }
}
