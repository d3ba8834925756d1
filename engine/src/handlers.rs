//! Command handlers module
//!
//! Implements the CLI commands: assemble the kernel from configuration,
//! submit or resume objectives, drive them to a terminal state while
//! streaming bus events, and inspect history and memory.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::cycle::{CycleController, CycleLimits, ObjectiveHandle, PhaseResult};
use crate::db::Database;
use crate::gateway::ToolGateway;
use crate::message_bus::{Event, EventType, MessageBus};
use crate::persona;
use crate::tools;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Fully wired kernel, as assembled from configuration.
pub struct Kernel {
    pub db: Arc<Database>,
    pub bus: Arc<MessageBus>,
    pub controller: CycleController,
}

/// Assemble database, registry, gateway, bus, and controller.
pub async fn build_kernel(config: &Config) -> Result<Kernel> {
    let db = Arc::new(
        Database::new(&config.core.data_dir.join("cadence.db"))
            .await
            .context("Failed to open kernel database")?,
    );

    let registry = Arc::new(persona::registry_from_config(config)?);
    if registry.is_empty() {
        tracing::warn!("No capabilities configured; every objective will block as unrouted");
    }

    let mut gateway = ToolGateway::new(Duration::from_secs(config.gateway.tool_timeout_secs));
    tools::register_builtin(&mut gateway, &config.core.workspace);

    let bus = Arc::new(MessageBus::new());

    let limits = CycleLimits {
        iteration_ceiling: config.cycle.iteration_ceiling,
        phase_retry_limit: config.cycle.phase_retry_limit,
    };

    let controller = CycleController::new(
        Arc::clone(&db),
        registry,
        Arc::new(gateway),
        Arc::clone(&bus),
        limits,
    );

    Ok(Kernel { db, bus, controller })
}

/// Final state of a driven objective.
#[derive(Debug, serde::Serialize)]
pub struct RunOutcome {
    pub objective_id: String,
    pub status: String,
    pub detail: String,
}

/// Advance an objective until it reaches a terminal result.
async fn drive(controller: &CycleController, handle: &ObjectiveHandle) -> Result<RunOutcome> {
    loop {
        let result = controller.advance(handle).await?;
        let outcome = match result {
            PhaseResult::Routed { .. } | PhaseResult::Committed { .. } => continue,
            PhaseResult::Done { summary } => RunOutcome {
                objective_id: handle.id().to_string(),
                status: "done".to_string(),
                detail: summary,
            },
            PhaseResult::Blocked { reason } => RunOutcome {
                objective_id: handle.id().to_string(),
                status: "blocked".to_string(),
                detail: reason,
            },
            PhaseResult::Failed { error, .. } => RunOutcome {
                objective_id: handle.id().to_string(),
                status: "failed".to_string(),
                detail: error.to_string(),
            },
            PhaseResult::Cancelled => RunOutcome {
                objective_id: handle.id().to_string(),
                status: "cancelled".to_string(),
                detail: "cancellation honored at phase boundary".to_string(),
            },
        };
        return Ok(outcome);
    }
}

/// Stream bus events to stdout while an objective runs.
async fn spawn_event_printer(bus: &MessageBus) {
    let mut rx = bus.subscribe(EventType::All).await;
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                Event::ObjectiveRouted { capability, .. } => {
                    println!("routed to capability '{capability}'");
                }
                Event::PhaseCompleted { phase, outcome, .. } => {
                    println!("  {} {}", phase, outcome.as_str().to_lowercase());
                }
                Event::ToolInvoked { tool, success, .. } => {
                    println!("    tool {} {}", tool, if success { "ok" } else { "failed" });
                }
                Event::ObjectiveBlocked { reason, .. } => {
                    println!("blocked: {reason}");
                }
                _ => {}
            }
        }
    });
}

fn print_outcome(outcome: &RunOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => {
            println!();
            println!("objective {} -> {}", outcome.objective_id, outcome.status);
            println!("{}", outcome.detail);
        }
    }
}

/// Handle `cadence run <description>`
pub async fn handle_run(
    config: &Config,
    description: &str,
    priority: i64,
    format: OutputFormat,
) -> Result<()> {
    let kernel = build_kernel(config).await?;

    if format == OutputFormat::Text {
        spawn_event_printer(&kernel.bus).await;
    }

    let handle = kernel.controller.submit(description, priority).await?;
    let outcome = drive(&kernel.controller, &handle).await?;
    print_outcome(&outcome, format);

    kernel.db.flush_wal().await?;
    Ok(())
}

/// Handle `cadence resume <objective-id>`
pub async fn handle_resume(config: &Config, objective_id: &str, format: OutputFormat) -> Result<()> {
    let kernel = build_kernel(config).await?;

    if format == OutputFormat::Text {
        spawn_event_printer(&kernel.bus).await;
    }

    let handle = kernel.controller.resume(objective_id).await?;
    let outcome = drive(&kernel.controller, &handle).await?;
    print_outcome(&outcome, format);

    kernel.db.flush_wal().await?;
    Ok(())
}

/// Handle `cadence history`
pub async fn handle_history(config: &Config, limit: usize, format: OutputFormat) -> Result<()> {
    let db = Database::new(&config.core.data_dir.join("cadence.db")).await?;
    let objectives = db.objectives().recent(limit as i64).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&objectives)?);
        }
        OutputFormat::Text => {
            if objectives.is_empty() {
                println!("no objectives yet");
            }
            for obj in objectives {
                println!(
                    "{}  {:<8} {:<10} {}",
                    obj.id,
                    obj.status.as_str(),
                    obj.assigned_handler.as_deref().unwrap_or("-"),
                    obj.description
                );
            }
        }
    }
    Ok(())
}

/// Handle `cadence replay <objective-id>`
pub async fn handle_replay(config: &Config, objective_id: &str, format: OutputFormat) -> Result<()> {
    let db = Database::new(&config.core.data_dir.join("cadence.db")).await?;
    let entries = db.memory().query(objective_id, None, None).await?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "seq": e.seq,
                        "id": e.id,
                        "phase": e.phase.as_str(),
                        "outcome": e.outcome.as_str(),
                        "timestamp": e.timestamp,
                        "payload": e.payload,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("no memory recorded for objective {objective_id}");
            }
            for entry in entries {
                println!(
                    "[{}] {:<7} {:<7} {}",
                    entry.seq.unwrap_or_default(),
                    entry.phase,
                    entry.outcome.as_str().to_lowercase(),
                    entry.payload
                );
            }
        }
    }
    Ok(())
}
