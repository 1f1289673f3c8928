//! Orchestrator — the Agent Execution Controller and its Router Agent.

pub mod aec;
pub mod router;
pub mod runtime;

pub use aec::AgentExecutionController;
pub use router::{Router, RoutingDecision};
pub use runtime::{Runtime, SystemStatus};
