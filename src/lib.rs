//! Agent Execution Controller (AEC)
//!
//! A Rust runtime that dispatches tasks to registered agent handlers behind
//! a confidence gate, escalating low-confidence responses to a fallback
//! provider under a two-level spend cap, backed by per-agent semantic
//! memory and a health supervisor that demotes and heals failing agents.

pub mod agent;
pub mod budget;
pub mod confidence;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod memory;
pub mod orchestrator;
pub mod task;

pub use config::RuntimeConfig;
pub use error::{AecError, HandlerError};
pub use events::{AecEvent, EventBus, TimestampedEvent};
pub use orchestrator::{AgentExecutionController, Router, Runtime};
pub use task::{Task, TaskKind};
