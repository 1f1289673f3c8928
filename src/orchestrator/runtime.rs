//! Runtime — the explicit container owning every long-lived collaborator.
//!
//! The controller, Health Supervisor, Confidence Gate, Semantic Memory, and
//! Budget Guard are concrete values owned by one `Runtime`, constructed at
//! startup and passed by reference to collaborators. Tests instantiate
//! fresh runtimes instead of reaching for a process-wide singleton.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OnceCell};
use tracing::info;

use crate::agent::{AgentDescriptor, FallbackProvider};
use crate::budget::{BudgetGuard, BudgetLedger};
use crate::confidence::ConfidenceGate;
use crate::config::RuntimeConfig;
use crate::events::EventBus;
use crate::health::{HealthReport, HealthSupervisor};
use crate::memory::SemanticMemory;

use super::aec::AgentExecutionController;

/// Aggregated snapshot returned by `GetSystemStatus`: per-agent health
/// metrics and status, the system rollup, and the budget ledger, in one
/// call so an operator doesn't have to stitch three RPCs together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub agents: Vec<AgentDescriptor>,
    pub health: HealthReport,
    pub budget: BudgetLedger,
}

/// Owns every collaborator and the one-shot initialisation barrier.
///
/// The first `execute` call after process start blocks on `initialised`
/// until `Runtime::initialise` completes; concurrent callers cooperate on
/// the same [`OnceCell`] rather than racing each other.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub memory: Arc<SemanticMemory>,
    pub confidence: Arc<ConfidenceGate>,
    pub health: Arc<HealthSupervisor>,
    pub budget: Arc<BudgetGuard>,
    pub events: Arc<EventBus>,
    pub controller: Arc<AgentExecutionController>,
    initialised: OnceCell<()>,
    shutdown: Arc<Notify>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, fallback_providers: Vec<Arc<dyn FallbackProvider>>) -> Self {
        let events = Arc::new(EventBus::new());
        let memory = Arc::new(SemanticMemory::new(
            config.max_memories,
            config.similarity_threshold,
            config.dedup_threshold,
        ));
        let confidence = Arc::new(ConfidenceGate::new());
        let health = Arc::new(HealthSupervisor::new(
            config.alert_threshold_consecutive_failures,
            config.stale_after_secs,
            events.clone(),
        ));

        let mut per_provider_limits = HashMap::new();
        for (provider, limit) in &config.budget_per_provider {
            per_provider_limits.insert(provider.clone(), *limit);
        }
        let budget = Arc::new(BudgetGuard::new(config.budget_global_limit, per_provider_limits));

        let controller = AgentExecutionController::new(
            memory.clone(),
            confidence.clone(),
            health.clone(),
            budget.clone(),
            events.clone(),
            fallback_providers,
            config.dispatch_deadline_secs,
            config.per_agent_concurrency,
        )
        .with_heal_deadline_secs(config.heal_deadline_secs);
        let controller = Arc::new(controller);

        Self {
            config,
            memory,
            confidence,
            health,
            budget,
            events,
            controller,
            initialised: OnceCell::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Double-checked-initialise: the first caller runs `init`, everyone
    /// else awaits the same cell.
    pub async fn ensure_initialised(&self) {
        self.initialised
            .get_or_init(|| async {
                info!("Runtime initialising");
            })
            .await;
    }

    /// Spawn the Health Supervisor's periodic scan loop as a single
    /// cancellable task: one ticker driving `scan()`, torn down cleanly via
    /// the shared `Notify` rather than aborting the task from outside.
    pub fn spawn_health_scan_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let health = self.health.clone();
        let interval_secs = self.config.health_check_interval_secs.max(1);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = health.scan().await;
                    }
                    _ = shutdown.notified() => {
                        info!("Health scan loop exiting on shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// `GetSystemStatus`: one aggregated snapshot combining agent
    /// descriptors, the Health Supervisor's report, and the Budget Guard's
    /// ledger.
    pub async fn system_status(&self) -> SystemStatus {
        SystemStatus {
            agents: self.controller.agents_snapshot().await,
            health: self.health.scan().await,
            budget: self.budget.status().await,
        }
    }
}
