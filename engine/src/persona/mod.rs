//! Built-in personas
//!
//! A persona is a capability handler. The built-in one is deliberately
//! boring: a playbook executor that walks an ordered list of tool requests,
//! one per cycle, and signals completion when the list is exhausted. All of
//! its behavior derives from the cycle view, so a resumed objective continues
//! exactly where it left off. Anything smarter (an LLM-backed persona, a
//! planner) plugs in through the same `Handler` trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::router::{Capability, CapabilityRegistry};
use sdk::{
    CycleView, Decision, DecisionPayload, Handler, HandlerError, ObservationPayload,
    OrientationPayload, ToolRequest, ToolResult,
};

/// Deterministic handler that executes a fixed playbook of tool requests.
pub struct PlaybookHandler {
    name: String,
    playbook: Vec<ToolRequest>,
}

impl PlaybookHandler {
    pub fn new(name: impl Into<String>, playbook: Vec<ToolRequest>) -> Self {
        Self {
            name: name.into(),
            playbook,
        }
    }

    /// Steps not yet completed, given the view's iteration count.
    fn remaining(&self, view: &CycleView) -> &[ToolRequest] {
        let done = (view.iteration as usize).min(self.playbook.len());
        &self.playbook[done..]
    }
}

#[async_trait]
impl Handler for PlaybookHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, view: &CycleView) -> Result<ObservationPayload, HandlerError> {
        let done = (view.iteration as usize).min(self.playbook.len());

        let mut facts = Vec::new();
        if let Some(act) = &view.last_act {
            for invocation in &act.invocations {
                let status = match &invocation.result {
                    ToolResult::Success { .. } => "ok".to_string(),
                    ToolResult::Failure { kind, .. } => format!("failed ({})", kind.as_str()),
                };
                facts.push(format!(
                    "{}: {} in {}ms",
                    invocation.request.tool_id, status, invocation.duration_ms
                ));
            }
        }

        Ok(ObservationPayload {
            summary: format!(
                "{}: {}/{} playbook steps complete",
                self.name,
                done,
                self.playbook.len()
            ),
            facts,
        })
    }

    async fn orient(&self, view: &CycleView) -> Result<OrientationPayload, HandlerError> {
        let failed_last = view
            .last_act
            .as_ref()
            .map(|act| act.invocations.iter().any(|i| !i.result.is_success()))
            .unwrap_or(false);

        let assessment = if failed_last {
            "previous step failed; it will be attempted again".to_string()
        } else if self.remaining(view).is_empty() {
            "playbook exhausted; ready to finish".to_string()
        } else {
            "on track".to_string()
        };

        let open_questions = self
            .remaining(view)
            .iter()
            .enumerate()
            .map(|(offset, request)| {
                format!(
                    "step {}: run {}",
                    view.iteration as usize + offset + 1,
                    request.tool_id
                )
            })
            .collect();

        Ok(OrientationPayload {
            assessment,
            open_questions,
        })
    }

    async fn decide(&self, view: &CycleView) -> Result<DecisionPayload, HandlerError> {
        let index = view.iteration as usize;
        match self.playbook.get(index) {
            Some(request) => Ok(DecisionPayload {
                rationale: format!("playbook step {} of {}", index + 1, self.playbook.len()),
                decision: Decision::Invoke {
                    requests: vec![request.clone()],
                },
            }),
            None => Ok(DecisionPayload {
                rationale: "playbook exhausted".to_string(),
                decision: Decision::Complete {
                    summary: format!(
                        "{} completed {} playbook steps",
                        self.name,
                        self.playbook.len()
                    ),
                },
            }),
        }
    }
}

/// Build the capability registry from configuration. Each configured
/// capability is backed by a playbook handler over its configured steps.
pub fn registry_from_config(config: &Config) -> anyhow::Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();

    for entry in &config.capabilities {
        let patterns: Vec<&str> = entry.trigger_patterns.iter().map(String::as_str).collect();
        let permissions: Vec<&str> = entry.tool_permissions.iter().map(String::as_str).collect();
        let capability = Capability::new(&entry.name, &patterns, &permissions, entry.priority)?;

        let playbook = entry
            .playbook
            .iter()
            .map(|step| ToolRequest {
                tool_id: step.tool.clone(),
                args: step.args.clone(),
            })
            .collect();

        registry.register(
            capability,
            Arc::new(PlaybookHandler::new(&entry.name, playbook)),
        )?;
    }

    Ok(registry)
}
