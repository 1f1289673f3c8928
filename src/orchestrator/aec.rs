//! Agent Execution Controller (AEC) — the central dispatch authority.
//!
//! A single entry point that fans a request out to its collaborators
//! (memory retrieval, the handler call itself, confidence evaluation,
//! escalation, bookkeeping) under one `#[tracing::instrument]`'d span.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::agent::{truncate, AgentDescriptor, AgentHandler, AgentResponse, AgentStatus, EnrichedContext, FallbackProvider};
use crate::budget::BudgetGuard;
use crate::confidence::ConfidenceGate;
use crate::error::AecError;
use crate::events::{AecEvent, EventBus};
use crate::health::{HealCallback, HealthSupervisor};
use crate::memory::SemanticMemory;
use crate::task::Task;

use super::router::{Router, RoutingDecision};

struct RegisteredAgent {
    descriptor: AgentDescriptor,
    handler: Arc<dyn AgentHandler>,
}

/// Heals a critical agent by re-invoking its own handler against a trivial
/// probe task; success means the handler answered within the deadline.
struct ProbeHeal {
    agents: Arc<RwLock<HashMap<String, RegisteredAgent>>>,
    deadline: std::time::Duration,
}

#[async_trait::async_trait]
impl HealCallback for ProbeHeal {
    async fn heal(&self, agent_id: &str) -> bool {
        let agents = self.agents.read().await;
        let Some(entry) = agents.get(agent_id) else { return false };
        let probe = Task::new(crate::task::TaskKind::Chat, "ping");
        let result = tokio::time::timeout(self.deadline, entry.handler.invoke(&probe, &EnrichedContext::empty())).await;
        matches!(result, Ok(Ok(_)))
    }
}

pub struct AgentExecutionController {
    agents: Arc<RwLock<HashMap<String, RegisteredAgent>>>,
    memory: Arc<SemanticMemory>,
    confidence: Arc<ConfidenceGate>,
    health: Arc<HealthSupervisor>,
    budget: Arc<BudgetGuard>,
    events: Arc<EventBus>,
    fallback_providers: HashMap<String, Arc<dyn FallbackProvider>>,
    router: Router,
    dispatch_deadline: std::time::Duration,
    heal_deadline: std::time::Duration,
    per_agent_concurrency: usize,
    semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl AgentExecutionController {
    pub fn new(
        memory: Arc<SemanticMemory>,
        confidence: Arc<ConfidenceGate>,
        health: Arc<HealthSupervisor>,
        budget: Arc<BudgetGuard>,
        events: Arc<EventBus>,
        fallback_providers: Vec<Arc<dyn FallbackProvider>>,
        dispatch_deadline_secs: u64,
        per_agent_concurrency: usize,
    ) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            memory,
            confidence,
            health,
            budget,
            events,
            fallback_providers: fallback_providers.into_iter().map(|p| (p.name().to_string(), p)).collect(),
            router: Router::new("general_chat"),
            dispatch_deadline: std::time::Duration::from_secs(dispatch_deadline_secs.max(1)),
            heal_deadline: std::time::Duration::from_secs(10),
            per_agent_concurrency: per_agent_concurrency.max(1),
            semaphores: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_heal_deadline_secs(mut self, secs: u64) -> Self {
        self.heal_deadline = std::time::Duration::from_secs(secs.max(1));
        self
    }

    pub async fn register(&self, descriptor: AgentDescriptor, handler: Arc<dyn AgentHandler>) {
        self.health.register(&descriptor.id).await;
        let mut agents = self.agents.write().await;
        agents.insert(descriptor.id.clone(), RegisteredAgent { descriptor, handler });
    }

    /// Advisory routing only; does not dispatch. Callers typically follow
    /// with `execute(decision.agent_id, task)`.
    pub async fn route(&self, task: &Task) -> RoutingDecision {
        self.router.route(task).await
    }

    /// Snapshot of every registered agent's descriptor, with `status`
    /// refreshed from the Health Supervisor — the only component allowed to
    /// mutate it per the data model.
    pub async fn agents_snapshot(&self) -> Vec<AgentDescriptor> {
        let agents = self.agents.read().await;
        let mut out = Vec::with_capacity(agents.len());
        for entry in agents.values() {
            let mut descriptor = entry.descriptor.clone();
            if let Some(status) = self.health.status_of(&descriptor.id).await {
                descriptor.status = status;
            }
            out.push(descriptor);
        }
        out
    }

    /// Per-agent concurrency gate: the same `Semaphore` instance is handed
    /// out for a given agent id across calls, bounding how many `execute`
    /// calls for that agent may run their handler at once.
    async fn semaphore_for(&self, agent_id: &str) -> Arc<Semaphore> {
        {
            let semaphores = self.semaphores.read().await;
            if let Some(sem) = semaphores.get(agent_id) {
                return sem.clone();
            }
        }
        let mut semaphores = self.semaphores.write().await;
        semaphores
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_agent_concurrency)))
            .clone()
    }

    /// Dispatch algorithm: validate -> heal-if-critical -> enrich from
    /// memory -> invoke under deadline -> evaluate confidence -> escalate
    /// if warranted and admitted -> persist to memory -> record outcome.
    #[instrument(skip(self, task), fields(agent_id = %agent_id, task_id = %task.id))]
    pub async fn execute(&self, agent_id: &str, task: &Task) -> Result<AgentResponse, AecError> {
        let descriptor = {
            let agents = self.agents.read().await;
            agents
                .get(agent_id)
                .map(|a| a.descriptor.clone())
                .ok_or_else(|| AecError::InvalidInput(format!("unknown agent {agent_id}")))?
        };

        // `status` is mutated only by the Health Supervisor; consult it as
        // the single source of truth rather than the registry's copy, which
        // is only ever set once at `register` time.
        let status = self.health.status_of(agent_id).await.unwrap_or(descriptor.status);

        if status == AgentStatus::Failed {
            return Err(AecError::Unavailable(format!("agent {agent_id} has failed and accepts no dispatches")));
        }

        if status == AgentStatus::Critical {
            info!("Agent {} is critical; attempting inline heal before dispatch", agent_id);
            let heal = ProbeHeal { agents: self.agents.clone(), deadline: self.heal_deadline };
            self.health.heal(agent_id, &heal).await?;
        }

        let semaphore = self.semaphore_for(agent_id).await;
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| AecError::Internal(anyhow::anyhow!("per-agent concurrency semaphore closed: {e}")))?;

        let context = match self.memory.retrieve(agent_id, task.query_text(), 5).await {
            Ok(hits) => EnrichedContext { contextual_memories: hits },
            Err(e) => {
                warn!("Memory retrieval failed for agent {}: {}", agent_id, e);
                EnrichedContext::empty()
            }
        };

        let handler = {
            let agents = self.agents.read().await;
            agents
                .get(agent_id)
                .map(|a| a.handler.clone())
                .ok_or_else(|| AecError::InvalidInput(format!("unknown agent {agent_id}")))?
        };

        let start = Instant::now();
        let dispatched = tokio::time::timeout(self.dispatch_deadline, handler.invoke(task, &context)).await;

        let mut response = match dispatched {
            Err(_) => {
                self.health.record_failure(agent_id, "dispatch deadline exceeded").await;
                return Err(AecError::Timeout);
            }
            Ok(Err(handler_err)) => {
                self.health.record_failure(agent_id, handler_err.to_string()).await;
                return Err(handler_err.into());
            }
            Ok(Ok(response)) => response,
        };

        debug!(agent = %agent_id, response = %truncate(&response.content, 200), "handler returned");

        let evaluation = self.confidence.evaluate(&response, &descriptor.kind, descriptor.confidence_threshold);

        if evaluation.should_escalate {
            self.events.publish(AecEvent::EscalationTriggered {
                agent_id: agent_id.to_string(),
                score: evaluation.score,
                threshold: evaluation.threshold,
            });
            self.try_escalate(&descriptor, task, &mut response, evaluation.score).await;
        }

        let mut metadata = Map::new();
        metadata.insert("model".to_string(), json!(response.model));
        metadata.insert("escalated".to_string(), json!(response.escalated));
        let _ = self
            .memory
            .store(agent_id, &format!("Q: {}\nA: {}", task.query_text(), response.content), metadata)
            .await;

        self.health.record_success(agent_id, start.elapsed().as_millis() as u64).await;

        Ok(response)
    }

    /// Attempt the escalation path: admit through the Budget Guard,
    /// call the fallback provider, and tag the response either way. Never
    /// returns an error; escalation failure degrades to the primary
    /// response with `escalation_failed` set.
    async fn try_escalate(&self, descriptor: &AgentDescriptor, task: &Task, response: &mut AgentResponse, original_confidence: f32) {
        let Some(fallback_model) = &descriptor.fallback_model else {
            response.mark_escalation_failed("no fallback model configured for this agent");
            self.health.record_escalation(&descriptor.id, true).await;
            self.events.publish(AecEvent::EscalationFailed {
                agent_id: descriptor.id.clone(),
                reason: "no fallback model configured".to_string(),
            });
            return;
        };

        let recommendation = self.budget.recommend(&descriptor.kind.to_string(), ESCALATION_COST_ESTIMATE).await;
        let Some(provider) = self.fallback_providers.get(&recommendation.recommended) else {
            response.mark_escalation_failed(format!("no fallback provider registered for {}", recommendation.recommended));
            self.health.record_escalation(&descriptor.id, true).await;
            self.events.publish(AecEvent::EscalationFailed {
                agent_id: descriptor.id.clone(),
                reason: format!("no provider for {}", recommendation.recommended),
            });
            return;
        };

        let admission = self.budget.check(provider.name(), ESCALATION_COST_ESTIMATE).await;
        if !admission.admitted {
            response.mark_escalation_failed("budget guard denied escalation");
            self.health.record_escalation(&descriptor.id, true).await;
            self.events.publish(AecEvent::EscalationFailed {
                agent_id: descriptor.id.clone(),
                reason: "budget_exceeded".to_string(),
            });
            return;
        }

        match provider.call(task.query_text(), fallback_model, &json!({})).await {
            Ok(escalated) => {
                let _ = self
                    .budget
                    .record(provider.name(), ESCALATION_COST_ESTIMATE, escalated.tokens_in, escalated.tokens_out)
                    .await;
                *response = escalated;
                response.mark_escalated(original_confidence);
                self.health.record_escalation(&descriptor.id, false).await;
                self.events.publish(AecEvent::EscalationCompleted { agent_id: descriptor.id.clone() });
            }
            Err(e) => {
                response.mark_escalation_failed(e.to_string());
                self.health.record_escalation(&descriptor.id, true).await;
                self.events.publish(AecEvent::EscalationFailed { agent_id: descriptor.id.clone(), reason: e.to_string() });
            }
        }
    }
}

/// Flat per-call cost placeholder: the controller has no pricing table of
/// its own, so every escalation is budgeted as this fixed unit. A real
/// deployment would estimate from prompt/response token counts.
const ESCALATION_COST_ESTIMATE: f64 = 0.01;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDescriptor, FnHandler};
    use crate::error::HandlerError;
    use crate::task::TaskKind;

    fn controller() -> AgentExecutionController {
        AgentExecutionController::new(
            Arc::new(SemanticMemory::new(1000, 0.75, 0.90)),
            Arc::new(ConfidenceGate::new()),
            Arc::new(HealthSupervisor::new(3, 300, Arc::new(EventBus::new()))),
            Arc::new(BudgetGuard::new(100.0, HashMap::new())),
            Arc::new(EventBus::new()),
            vec![],
            5,
            1,
        )
    }

    #[tokio::test]
    async fn unknown_agent_is_rejected() {
        let controller = controller();
        let task = Task::new(TaskKind::Chat, "hi there friend");
        let err = controller.execute("ghost", &task).await.unwrap_err();
        assert!(matches!(err, AecError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn happy_path_returns_response_and_updates_health() {
        let controller = controller();
        let descriptor = AgentDescriptor::new("echo", TaskKind::Chat);
        let handler = Arc::new(FnHandler(|task: Task, _ctx: EnrichedContext| async move {
            Ok(AgentResponse::new("a".repeat(120), "llama3.2:3b", 5))
        }));
        controller.register(descriptor, handler).await;

        let task = Task::new(TaskKind::Chat, "please summarize the quarterly report in detail");
        let response = controller.execute("echo", &task).await.unwrap();
        assert!(!response.content.is_empty());
    }

    struct AlwaysFailHeal;

    #[async_trait::async_trait]
    impl crate::health::HealCallback for AlwaysFailHeal {
        async fn heal(&self, _agent_id: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn failed_agent_is_rejected_without_dispatch() {
        let controller = controller();
        let descriptor = AgentDescriptor::new("broken", TaskKind::Chat);
        let handler = Arc::new(FnHandler(|_task: Task, _ctx: EnrichedContext| async move {
            Err(HandlerError::Internal("should never run".to_string()))
        }));
        controller.register(descriptor, handler).await;

        // Drive the agent to `failed` through the Health Supervisor, the
        // only component the data model allows to make that transition.
        controller.health.record_failure("broken", "e1").await;
        controller.health.record_failure("broken", "e2").await;
        controller.health.record_failure("broken", "e3").await;
        assert!(controller.health.heal("broken", &AlwaysFailHeal).await.is_err());

        let task = Task::new(TaskKind::Chat, "hello there, anyone home?");
        let err = controller.execute("broken", &task).await.unwrap_err();
        assert!(matches!(err, AecError::Unavailable(_)));
    }

    #[tokio::test]
    async fn critical_status_from_health_supervisor_triggers_inline_heal() {
        let controller = controller();
        let descriptor = AgentDescriptor::new("flaky", TaskKind::Chat);
        let handler = Arc::new(FnHandler(|task: Task, _ctx: EnrichedContext| async move {
            if task.payload == "ping" {
                Ok(AgentResponse::new("pong", "llama3.2:3b", 5))
            } else {
                Ok(AgentResponse::new("a".repeat(120), "llama3.2:3b", 5))
            }
        }));
        controller.register(descriptor, handler).await;

        // Nothing in the registry's own descriptor ever flips to `critical`;
        // only the Health Supervisor's state does.
        controller.health.record_failure("flaky", "e1").await;
        controller.health.record_failure("flaky", "e2").await;
        assert!(controller.health.record_failure("flaky", "e3").await);
        assert_eq!(controller.health.status_of("flaky").await, Some(AgentStatus::Critical));

        let task = Task::new(TaskKind::Chat, "please try again now");
        let response = controller.execute("flaky", &task).await.unwrap();
        assert!(!response.content.is_empty());
        assert_eq!(controller.health.status_of("flaky").await, Some(AgentStatus::Ready));
    }

    #[tokio::test]
    async fn per_agent_concurrency_cap_bounds_simultaneous_dispatch() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let controller = Arc::new(AgentExecutionController::new(
            Arc::new(SemanticMemory::new(1000, 0.75, 0.90)),
            Arc::new(ConfidenceGate::new()),
            Arc::new(HealthSupervisor::new(3, 300, Arc::new(EventBus::new()))),
            Arc::new(BudgetGuard::new(100.0, HashMap::new())),
            Arc::new(EventBus::new()),
            vec![],
            5,
            2,
        ));
        let descriptor = AgentDescriptor::new("capped", TaskKind::Chat);
        let current = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let current_for_handler = current.clone();
        let max_seen_for_handler = max_seen.clone();
        let handler = Arc::new(FnHandler(move |_task: Task, _ctx: EnrichedContext| {
            let current = current_for_handler.clone();
            let max_seen = max_seen_for_handler.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(AgentResponse::new("done", "llama3.2:3b", 30))
            }
        }));
        controller.register(descriptor, handler).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                let task = Task::new(TaskKind::Chat, format!("distinct concurrent request {i}"));
                controller.execute("capped", &task).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2, "observed {} concurrent dispatches, cap was 2", max_seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn escalation_without_fallback_model_degrades_gracefully() {
        let controller = controller();
        let descriptor = AgentDescriptor::new("hedge", TaskKind::Chat).with_confidence_threshold(0.99);
        let handler = Arc::new(FnHandler(|_task: Task, _ctx: EnrichedContext| async move {
            Ok(AgentResponse::new("I'm not sure", "llama3.2:3b", 10))
        }));
        controller.register(descriptor, handler).await;

        let task = Task::new(TaskKind::Chat, "what should our pricing strategy be this year?");
        let response = controller.execute("hedge", &task).await.unwrap();
        assert!(response.escalation_failed);
        assert!(!response.escalated);
    }
}
