//! Health Supervisor (HS).
//!
//! Observes per-agent execution outcomes, classifies health, and drives
//! recovery. State machine: `healthy -> degraded -> critical -> failed`,
//! with `degraded`/`critical -> healthy` on a successful run.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::agent::AgentStatus;
use crate::error::AecError;
use crate::events::{AecEvent, EventBus, SystemAlertKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent_id: String,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub consecutive_failures: u32,
    pub avg_execution_time_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
    pub error_history: VecDeque<String>,
    pub escalations: u64,
    pub escalation_failures: u64,
}

impl AgentMetrics {
    fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            total: 0,
            successful: 0,
            failed: 0,
            consecutive_failures: 0,
            avg_execution_time_ms: 0.0,
            last_execution: None,
            error_history: VecDeque::with_capacity(10),
            escalations: 0,
            escalation_failures: 0,
        }
    }

    fn push_error(&mut self, error: String) {
        if self.error_history.len() >= 10 {
            self.error_history.pop_front();
        }
        self.error_history.push_back(error);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRollup {
    pub total_requests: u64,
    pub total_errors: u64,
    pub uptime_secs: u64,
    pub memory_usage_pct: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub agents: HashMap<String, AgentMetrics>,
    pub system: SystemRollup,
}

/// Callback the controller supplies so HS can drive recovery without
/// depending on the concrete handler registry.
#[async_trait::async_trait]
pub trait HealCallback: Send + Sync {
    async fn heal(&self, agent_id: &str) -> bool;
}

struct AgentState {
    metrics: AgentMetrics,
    status: AgentStatus,
}

pub struct HealthSupervisor {
    agents: RwLock<HashMap<String, AgentState>>,
    alert_threshold: u32,
    stale_after: chrono::Duration,
    memory_ceiling_bytes: u64,
    events: Arc<EventBus>,
    start_time: std::time::Instant,
}

impl HealthSupervisor {
    pub fn new(alert_threshold: u32, stale_after_secs: u64, events: Arc<EventBus>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            alert_threshold,
            stale_after: chrono::Duration::seconds(stale_after_secs as i64),
            memory_ceiling_bytes: 0,
            events,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_memory_ceiling_bytes(mut self, ceiling: u64) -> Self {
        self.memory_ceiling_bytes = ceiling;
        self
    }

    pub async fn register(&self, agent_id: &str) {
        let mut agents = self.agents.write().await;
        agents.entry(agent_id.to_string()).or_insert_with(|| AgentState {
            metrics: AgentMetrics::new(agent_id),
            status: AgentStatus::Ready,
        });
    }

    pub async fn status_of(&self, agent_id: &str) -> Option<AgentStatus> {
        self.agents.read().await.get(agent_id).map(|s| s.status)
    }

    /// Record a successful execution. Resets `consecutive_failures` and
    /// recovers a degraded/critical agent to healthy.
    pub async fn record_success(&self, agent_id: &str, execution_time_ms: u64) {
        let mut agents = self.agents.write().await;
        let state = agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState { metrics: AgentMetrics::new(agent_id), status: AgentStatus::Ready });

        state.metrics.total += 1;
        state.metrics.successful += 1;
        state.metrics.consecutive_failures = 0;
        state.metrics.last_execution = Some(Utc::now());
        let n = state.metrics.total as f64;
        state.metrics.avg_execution_time_ms =
            state.metrics.avg_execution_time_ms + (execution_time_ms as f64 - state.metrics.avg_execution_time_ms) / n;

        if matches!(state.status, AgentStatus::Degraded | AgentStatus::Critical) {
            state.status = AgentStatus::Ready;
            info!("Agent {} recovered to healthy", agent_id);
            self.events.publish(AecEvent::AgentRecovered { agent_id: agent_id.to_string() });
        }
    }

    /// Record a failure. Returns `true` if the agent entered `critical` and
    /// a heal attempt should be driven by the caller via [`Self::heal`].
    pub async fn record_failure(&self, agent_id: &str, error: impl Into<String>) -> bool {
        let mut agents = self.agents.write().await;
        let state = agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState { metrics: AgentMetrics::new(agent_id), status: AgentStatus::Ready });

        state.metrics.total += 1;
        state.metrics.failed += 1;
        state.metrics.consecutive_failures += 1;
        state.metrics.last_execution = Some(Utc::now());
        state.metrics.push_error(error.into());

        let failures = state.metrics.consecutive_failures;
        if failures >= self.alert_threshold {
            state.status = AgentStatus::Critical;
            warn!("Agent {} is critical after {} consecutive failures", agent_id, failures);
            self.events.publish(AecEvent::AgentCritical { agent_id: agent_id.to_string(), consecutive_failures: failures });
            true
        } else if failures >= 2 {
            state.status = AgentStatus::Degraded;
            warn!("Agent {} is degraded after {} consecutive failures", agent_id, failures);
            self.events.publish(AecEvent::AgentDegraded { agent_id: agent_id.to_string(), consecutive_failures: failures });
            false
        } else {
            false
        }
    }

    /// Drive a heal attempt for `agent_id` via `callback`. Transitions to
    /// `healthy` on success (resetting `consecutive_failures`) or `failed`
    /// on failure (terminal: no further automatic retries).
    pub async fn heal(&self, agent_id: &str, callback: &dyn HealCallback) -> Result<(), AecError> {
        let ok = callback.heal(agent_id).await;
        let mut agents = self.agents.write().await;
        let Some(state) = agents.get_mut(agent_id) else {
            return Err(AecError::Unavailable(format!("unknown agent {agent_id}")));
        };

        if ok {
            state.status = AgentStatus::Ready;
            state.metrics.consecutive_failures = 0;
            info!("Agent {} restarted successfully", agent_id);
            self.events.publish(AecEvent::AgentRestarted { agent_id: agent_id.to_string(), success: true });
            Ok(())
        } else {
            state.status = AgentStatus::Failed;
            warn!("Agent {} restart failed; marking failed", agent_id);
            self.events.publish(AecEvent::AgentRestartFailed { agent_id: agent_id.to_string() });
            Err(AecError::Unavailable(format!("heal failed for agent {agent_id}")))
        }
    }

    pub async fn record_escalation(&self, agent_id: &str, failed: bool) {
        let mut agents = self.agents.write().await;
        if let Some(state) = agents.get_mut(agent_id) {
            state.metrics.escalations += 1;
            if failed {
                state.metrics.escalation_failures += 1;
            }
        }
    }

    /// Periodic scan: flags stale agents and raises system alerts. Intended
    /// to be driven by a single supervisor loop (see
    /// [`crate::orchestrator::runtime::Runtime::spawn_health_scan_loop`]),
    /// not a raw timer per call site.
    pub async fn scan(&self) -> HealthReport {
        let now = Utc::now();
        let mut agents = self.agents.write().await;

        let mut total_requests = 0u64;
        let mut total_errors = 0u64;
        for state in agents.values_mut() {
            total_requests += state.metrics.total;
            total_errors += state.metrics.failed;

            if let Some(last) = state.metrics.last_execution {
                if now.signed_duration_since(last) > self.stale_after {
                    warn!("Agent {} is stale (no execution in {:?})", state.metrics.agent_id, self.stale_after);
                }
            }
        }

        let error_rate = if total_requests > 0 {
            total_errors as f32 / total_requests as f32
        } else {
            0.0
        };
        if error_rate > 0.05 {
            self.events.publish(AecEvent::SystemAlert {
                kind: SystemAlertKind::HighErrorRate,
                detail: format!("error rate {:.2}% exceeds 5%", error_rate * 100.0),
            });
        }

        let memory_usage_pct = self.current_memory_usage_pct();
        if self.memory_ceiling_bytes > 0 && memory_usage_pct > 85.0 {
            self.events.publish(AecEvent::SystemAlert {
                kind: SystemAlertKind::HighMemoryUsage,
                detail: format!("memory usage {:.1}% exceeds 85% ceiling", memory_usage_pct),
            });
        }

        HealthReport {
            agents: agents.values().map(|s| (s.metrics.agent_id.clone(), s.metrics.clone())).collect(),
            system: SystemRollup {
                total_requests,
                total_errors,
                uptime_secs: self.start_time.elapsed().as_secs(),
                memory_usage_pct,
            },
        }
    }

    fn current_memory_usage_pct(&self) -> f32 {
        if self.memory_ceiling_bytes == 0 {
            return 0.0;
        }
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let used = sys.used_memory();
        (used as f32 / self.memory_ceiling_bytes as f32) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHeal(bool);

    #[async_trait::async_trait]
    impl HealCallback for AlwaysHeal {
        async fn heal(&self, _agent_id: &str) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn consecutive_failures_reset_on_success() {
        let hs = HealthSupervisor::new(3, 300, Arc::new(EventBus::new()));
        hs.record_failure("a", "boom").await;
        hs.record_failure("a", "boom").await;
        hs.record_success("a", 10).await;
        let report = hs.scan().await;
        assert_eq!(report.agents["a"].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn three_failures_trigger_critical() {
        let hs = HealthSupervisor::new(3, 300, Arc::new(EventBus::new()));
        assert!(!hs.record_failure("a", "e1").await);
        assert!(!hs.record_failure("a", "e2").await);
        assert!(hs.record_failure("a", "e3").await);
        assert_eq!(hs.status_of("a").await, Some(AgentStatus::Critical));
    }

    #[tokio::test]
    async fn heal_success_returns_agent_to_healthy() {
        let hs = HealthSupervisor::new(3, 300, Arc::new(EventBus::new()));
        hs.record_failure("a", "e1").await;
        hs.record_failure("a", "e2").await;
        hs.record_failure("a", "e3").await;
        hs.heal("a", &AlwaysHeal(true)).await.unwrap();
        assert_eq!(hs.status_of("a").await, Some(AgentStatus::Ready));
        let report = hs.scan().await;
        assert_eq!(report.agents["a"].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn heal_failure_marks_agent_failed_terminally() {
        let hs = HealthSupervisor::new(3, 300, Arc::new(EventBus::new()));
        hs.record_failure("a", "e1").await;
        hs.record_failure("a", "e2").await;
        hs.record_failure("a", "e3").await;
        assert!(hs.heal("a", &AlwaysHeal(false)).await.is_err());
        assert_eq!(hs.status_of("a").await, Some(AgentStatus::Failed));
    }

    #[tokio::test]
    async fn error_history_bounded_to_ten() {
        let hs = HealthSupervisor::new(100, 300, Arc::new(EventBus::new()));
        for i in 0..15 {
            hs.record_failure("a", format!("error {i}")).await;
        }
        let report = hs.scan().await;
        assert_eq!(report.agents["a"].error_history.len(), 10);
    }
}
