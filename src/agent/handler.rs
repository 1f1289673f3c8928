//! Agent handler contract.
//!
//! An async-trait object behind `Arc`, `Send + Sync` so it can be dispatched
//! from any worker in the tokio pool. Handlers must be reentrant and honour
//! the deadline passed by the controller via `tokio::time::timeout`.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::memory::ScoredRecord;
use crate::task::Task;

use super::response::AgentResponse;

/// Context assembled by the controller before dispatch: memories retrieved
/// from the Semantic Memory that scored at or above the similarity
/// threshold.
#[derive(Debug, Clone, Default)]
pub struct EnrichedContext {
    pub contextual_memories: Vec<ScoredRecord>,
}

impl EnrichedContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_memories(&self) -> bool {
        !self.contextual_memories.is_empty()
    }
}

#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn invoke(&self, task: &Task, context: &EnrichedContext) -> Result<AgentResponse, HandlerError>;
}

/// A handler built from a plain async closure, for tests and simple
/// deployments that don't need a dedicated type per agent.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> AgentHandler for FnHandler<F>
where
    F: Fn(Task, EnrichedContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<AgentResponse, HandlerError>> + Send,
{
    async fn invoke(&self, task: &Task, context: &EnrichedContext) -> Result<AgentResponse, HandlerError> {
        (self.0)(task.clone(), context.clone()).await
    }
}
