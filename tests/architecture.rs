//! Architecture verification suite.
//!
//! Compile-time checks that the controller's shared components are
//! `Send + Sync`, since the orchestrator passes them `Arc`-wrapped between
//! worker tasks.

#[cfg(test)]
mod architecture_tests {
    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn shared_components_are_thread_safe() {
        assert_send_sync::<aec::memory::SemanticMemory>();
        assert_send_sync::<aec::confidence::ConfidenceGate>();
        assert_send_sync::<aec::health::HealthSupervisor>();
        assert_send_sync::<aec::budget::BudgetGuard>();
        assert_send_sync::<aec::orchestrator::AgentExecutionController>();
        assert_send_sync::<aec::orchestrator::Runtime>();
        assert_send_sync::<aec::EventBus>();
        assert_send_sync::<aec::orchestrator::Router>();
    }

    #[test]
    fn handler_and_provider_traits_are_object_safe_and_thread_safe() {
        assert_send_sync::<std::sync::Arc<dyn aec::agent::AgentHandler>>();
        assert_send_sync::<std::sync::Arc<dyn aec::agent::FallbackProvider>>();
        assert_send_sync::<std::sync::Arc<dyn aec::health::HealCallback>>();
    }

    #[test]
    fn data_model_types_are_clonable_and_serializable() {
        fn assert_clone_serde<T: Clone + serde::Serialize + for<'de> serde::Deserialize<'de>>() {}
        assert_clone_serde::<aec::Task>();
        assert_clone_serde::<aec::TaskKind>();
        assert_clone_serde::<aec::agent::AgentDescriptor>();
        assert_clone_serde::<aec::agent::AgentResponse>();
        assert_clone_serde::<aec::memory::MemoryRecord>();
        assert_clone_serde::<aec::confidence::ConfidenceEvaluation>();
        assert_clone_serde::<aec::health::AgentMetrics>();
        assert_clone_serde::<aec::budget::BudgetLedger>();
        assert_clone_serde::<aec::AecEvent>();
        assert_clone_serde::<aec::orchestrator::SystemStatus>();
    }
}
