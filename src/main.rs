//! Agent Execution Controller — CLI harness
//!
//! Thin binary wiring a demo `Runtime` together: loads config, installs the
//! tracing subscriber, registers a couple of stub agents, and drives a small
//! command loop for manually exercising dispatch/routing/status.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aec::agent::{AgentDescriptor, AgentHandler, AgentResponse, EnrichedContext, FnHandler};
use aec::{AecError, RuntimeConfig, Runtime, Task, TaskKind};

fn load_config() -> RuntimeConfig {
    match std::fs::read_to_string("aec.config.yaml") {
        Ok(content) => match RuntimeConfig::from_yaml(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to parse aec.config.yaml ({e}); using defaults");
                RuntimeConfig::default()
            }
        },
        Err(_) => RuntimeConfig::default(),
    }
}

/// A handler that always answers, used to demonstrate the happy path
/// without depending on any real model provider being reachable.
fn echo_handler() -> Arc<dyn AgentHandler> {
    Arc::new(FnHandler(|task: Task, ctx: EnrichedContext| async move {
        let recalled = if ctx.has_memories() { " (recalled prior context)" } else { "" };
        Ok(AgentResponse::new(format!("Echo agent received: {}{}", task.payload, recalled), "echo-1.0", 5))
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let mut config = load_config();
    if config.budget_global_limit <= 0.0 {
        config.budget_global_limit = 10.0;
        config.budget_per_provider = HashMap::from([("openai".to_string(), 5.0)]);
    }

    println!("\n{}", "=".repeat(60));
    println!("Agent Execution Controller");
    println!("{}", "=".repeat(60));

    let runtime = Arc::new(Runtime::new(config, vec![]));
    runtime.ensure_initialised().await;
    let _health_loop = runtime.spawn_health_scan_loop();

    let descriptor = AgentDescriptor::new("general_chat", TaskKind::Chat).with_display_name("General Chat Agent");
    runtime.controller.register(descriptor, echo_handler()).await;

    let coder_descriptor = AgentDescriptor::new("coder", TaskKind::Code).with_display_name("Coder Agent");
    runtime.controller.register(coder_descriptor, echo_handler()).await;

    info!("Runtime ready with 2 registered agents");
    println!("Commands: 'route <text>' | 'ask <agent> <text>' | 'status' | 'system' | 'budget' | 'quit'\n");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line == "quit" || line == "exit" {
            runtime.shutdown();
            println!("Shutting down.");
            break;
        }

        if line == "status" {
            let report = runtime.health.scan().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            continue;
        }

        if line == "system" {
            let status = runtime.system_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            continue;
        }

        if line == "budget" {
            let ledger = runtime.budget.status().await;
            println!("{}", serde_json::to_string_pretty(&ledger)?);
            continue;
        }

        if let Some(rest) = line.strip_prefix("route ") {
            let task = Task::new(TaskKind::Chat, rest);
            let decision = runtime.controller.route(&task).await;
            println!("-> {} (confidence {:.2}): {}", decision.agent_id, decision.confidence, decision.reason);
            continue;
        }

        if let Some(rest) = line.strip_prefix("ask ") {
            let mut parts = rest.splitn(2, ' ');
            let agent_id = parts.next().unwrap_or_default();
            let payload = parts.next().unwrap_or_default();
            if payload.is_empty() {
                println!("usage: ask <agent> <text>");
                continue;
            }
            let task = Task::new(TaskKind::Chat, payload);
            match runtime.controller.execute(agent_id, &task).await {
                Ok(response) => println!("{}", response.content),
                Err(AecError::InvalidInput(msg)) => println!("invalid input: {msg}"),
                Err(e) => println!("error: {e}"),
            }
            continue;
        }

        println!("unrecognized command; try 'route', 'ask', 'status', 'system', 'budget', or 'quit'");
    }

    Ok(())
}
