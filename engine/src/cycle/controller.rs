//! Cycle Controller
//!
//! This module implements the core control loop that orchestrates objective
//! execution. Each objective moves through a bounded state machine:
//!
//! `QUEUED -> ROUTING -> OBSERVE -> ORIENT -> DECIDE -> ACT -> (OBSERVE | DONE | FAILED | BLOCKED)`
//!
//! `advance` performs exactly one transition per call, which keeps the step
//! model cooperative: external schedulers interleave objectives freely and a
//! cancellation request is honored at the next boundary. Every committed
//! phase writes one memory entry and the objective's ledger snapshot in a
//! single transaction, so a restart can always resume on a clean boundary.
//!
//! # Limits
//!
//! - OBSERVE→ACT cycles per objective are capped (`iteration_ceiling`)
//! - Failing phases are retried a bounded number of times
//!   (`phase_retry_limit`); a failed ACT replans through ORIENT
//! - Tool deadlines are enforced by the gateway, not here

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{
    ContinuityLedger, Database, MemoryEntry, MemoryStore, Objective, ObjectiveRepository,
    ObjectiveStatus,
};
use crate::gateway::ToolGateway;
use crate::message_bus::{Event, MessageBus};
use crate::router::{Capability, CapabilityRegistry, CapabilityRouter};
use sdk::{
    ActPayload, CycleView, Decision, DecisionPayload, FailureKind, Handler, KernelError,
    LedgerSnapshot, Outcome, Phase, ToolResult,
};

use super::types::{next_phase, ObjectiveHandle, PhaseResult};

/// Configured safety limits of the cycle loop.
#[derive(Debug, Clone, Copy)]
pub struct CycleLimits {
    /// Maximum completed OBSERVE→ACT cycles per objective.
    pub iteration_ceiling: u32,
    /// Failed phase commits tolerated since the last successful ACT.
    pub phase_retry_limit: u32,
}

impl Default for CycleLimits {
    fn default() -> Self {
        Self {
            iteration_ceiling: 16,
            phase_retry_limit: 3,
        }
    }
}

/// Mutable per-objective state, guarded by the advancement lock.
struct CycleState {
    objective: Objective,
    snapshot: LedgerSnapshot,
    /// Decision committed in DECIDE, consumed by the next ACT. Rebuilt from
    /// memory on resume.
    pending_decision: Option<Decision>,
}

/// One registered objective: its state behind the per-objective advancement
/// lock, plus the cooperative cancellation slot.
struct ObjectiveCell {
    state: Mutex<CycleState>,
    cancel: StdMutex<Option<String>>,
}

impl ObjectiveCell {
    fn take_cancel(&self) -> Option<String> {
        self.cancel.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Cycle Controller that drives objectives through their phases.
pub struct CycleController {
    db: Arc<Database>,
    objectives: ObjectiveRepository,
    memory: MemoryStore,
    ledger: ContinuityLedger,
    registry: Arc<CapabilityRegistry>,
    router: CapabilityRouter,
    gateway: Arc<ToolGateway>,
    bus: Arc<MessageBus>,
    limits: CycleLimits,
    cells: Mutex<HashMap<String, Arc<ObjectiveCell>>>,
}

impl CycleController {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<CapabilityRegistry>,
        gateway: Arc<ToolGateway>,
        bus: Arc<MessageBus>,
        limits: CycleLimits,
    ) -> Self {
        Self {
            objectives: db.objectives(),
            memory: db.memory(),
            ledger: db.ledger(),
            router: CapabilityRouter::new(Arc::clone(&registry)),
            db,
            registry,
            gateway,
            bus,
            limits,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a new objective. Returns an opaque handle.
    pub async fn submit(
        &self,
        description: &str,
        priority: i64,
    ) -> Result<ObjectiveHandle, KernelError> {
        let id = Uuid::new_v4().to_string();
        let objective = self
            .objectives
            .create(&id, description, priority)
            .await
            .map_err(storage)?;

        info!("Submitted objective {}: {}", id, description);

        let cell = Arc::new(ObjectiveCell {
            state: Mutex::new(CycleState {
                snapshot: LedgerSnapshot::initial(&objective.id),
                objective,
                pending_decision: None,
            }),
            cancel: StdMutex::new(None),
        });
        self.cells.lock().await.insert(id.clone(), cell);

        self.bus
            .publish(Event::ObjectiveSubmitted {
                objective_id: id.clone(),
                description: description.to_string(),
            })
            .await;

        Ok(ObjectiveHandle::new(id))
    }

    /// Request cooperative cancellation. Honored at the next phase boundary;
    /// an in-flight tool call runs to completion (or its own timeout) first.
    pub async fn terminate(&self, handle: &ObjectiveHandle, reason: &str) -> Result<(), KernelError> {
        let cell = self.cell(handle.id()).await?;
        if let Ok(mut slot) = cell.cancel.lock() {
            *slot = Some(reason.to_string());
        }
        Ok(())
    }

    /// Perform exactly one phase transition for the objective.
    pub async fn advance(&self, handle: &ObjectiveHandle) -> Result<PhaseResult, KernelError> {
        let cell = self.cell(handle.id()).await?;

        // Per-objective advancement lock: two workers advancing the same
        // objective serialize here.
        let mut state = cell.state.lock().await;

        if let Some(reason) = cell.take_cancel() {
            return self.honor_cancellation(&mut state, reason).await;
        }

        match state.objective.status {
            ObjectiveStatus::Queued | ObjectiveStatus::Routing => {
                self.run_routing(&mut state).await
            }
            ObjectiveStatus::Active => self.run_phase(&mut state).await,
            ObjectiveStatus::Blocked => Ok(PhaseResult::Blocked {
                reason: "objective is blocked; resume it once the cause is fixed".to_string(),
            }),
            ObjectiveStatus::Done | ObjectiveStatus::Failed => Err(KernelError::UnknownObjective(
                format!("objective {} is already closed", state.objective.id),
            )),
        }
    }

    /// Rebuild in-flight state for an objective from its ledger snapshot and
    /// a memory query past the snapshot's cursor. This is the sole recovery
    /// path after a restart; it depends on no previous in-process state.
    pub async fn resume(&self, objective_id: &str) -> Result<ObjectiveHandle, KernelError> {
        let snapshot = self
            .ledger
            .resume(objective_id)
            .await?
            .ok_or_else(|| KernelError::UnknownObjective(objective_id.to_string()))?;

        let mut objective = self
            .objectives
            .get(objective_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| KernelError::UnknownObjective(objective_id.to_string()))?;

        if objective.status.is_terminal() {
            return Err(KernelError::UnknownObjective(format!(
                "objective {objective_id} is already closed"
            )));
        }

        // The checkpoint commits atomically with its memory entry, so this
        // should be empty; anything here means the snapshot predates memory.
        let trailing = self.memory.query_after(objective_id, snapshot.memory_cursor).await?;
        if !trailing.is_empty() {
            warn!(
                "Objective {} has {} memory entries past its snapshot cursor",
                objective_id,
                trailing.len()
            );
        }

        // An interrupted DECIDE→ACT edge needs its decision back.
        let pending_decision =
            if next_phase(snapshot.last_completed_phase, &snapshot.next_action_hint) == Phase::Act {
                match self.memory.latest_of_phase(objective_id, Phase::Decide).await? {
                    Some(entry) => {
                        let payload: DecisionPayload = serde_json::from_value(entry.payload)
                            .map_err(|e| {
                                KernelError::Storage(format!("corrupt DECIDE payload: {e}"))
                            })?;
                        Some(payload.decision)
                    }
                    None => None,
                }
            } else {
                None
            };

        if objective.status != ObjectiveStatus::Active {
            self.objectives
                .set_status(objective_id, ObjectiveStatus::Active)
                .await
                .map_err(storage)?;
            objective.status = ObjectiveStatus::Active;
        }

        info!(
            "Resumed objective {} at phase boundary after {:?} (iteration {})",
            objective_id, snapshot.last_completed_phase, snapshot.iteration
        );

        let cell = Arc::new(ObjectiveCell {
            state: Mutex::new(CycleState {
                objective,
                snapshot,
                pending_decision,
            }),
            cancel: StdMutex::new(None),
        });
        self.cells
            .lock()
            .await
            .insert(objective_id.to_string(), cell);

        Ok(ObjectiveHandle::new(objective_id))
    }

    /// Explicitly move an objective's checkpoint backward. The only path on
    /// which `last_completed_phase` may regress.
    pub async fn rollback(
        &self,
        handle: &ObjectiveHandle,
        to_phase: Option<Phase>,
    ) -> Result<(), KernelError> {
        let cell = self.cell(handle.id()).await?;
        let mut state = cell.state.lock().await;

        if state.objective.status.is_terminal() {
            return Err(KernelError::UnknownObjective(format!(
                "objective {} is already closed",
                state.objective.id
            )));
        }

        let mut snapshot = state.snapshot.clone();
        snapshot.last_completed_phase = to_phase;
        snapshot.next_action_hint = "retry".to_string();
        snapshot.phase_retries = 0;

        self.ledger.rollback(&snapshot).await?;
        state.snapshot = snapshot;
        state.pending_decision = None;

        info!(
            "Rolled back objective {} to phase boundary {:?}",
            state.objective.id, to_phase
        );
        Ok(())
    }

    async fn cell(&self, id: &str) -> Result<Arc<ObjectiveCell>, KernelError> {
        self.cells
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| KernelError::UnknownObjective(id.to_string()))
    }

    async fn honor_cancellation(
        &self,
        state: &mut CycleState,
        reason: String,
    ) -> Result<PhaseResult, KernelError> {
        info!(
            "Objective {} cancelled at phase boundary: {}",
            state.objective.id, reason
        );

        self.objectives
            .set_status(&state.objective.id, ObjectiveStatus::Blocked)
            .await
            .map_err(storage)?;
        state.objective.status = ObjectiveStatus::Blocked;

        self.bus
            .publish(Event::ObjectiveBlocked {
                objective_id: state.objective.id.clone(),
                reason,
            })
            .await;

        Ok(PhaseResult::Cancelled)
    }

    /// ROUTING: select a capability once, then enter the cycle loop.
    async fn run_routing(&self, state: &mut CycleState) -> Result<PhaseResult, KernelError> {
        let id = state.objective.id.clone();

        if state.objective.status == ObjectiveStatus::Queued {
            self.objectives
                .set_status(&id, ObjectiveStatus::Routing)
                .await
                .map_err(storage)?;
            state.objective.status = ObjectiveStatus::Routing;
        }

        match self.router.route(&state.objective.description) {
            Ok(capability) => {
                self.objectives.assign(&id, &capability).await.map_err(storage)?;
                state.objective.status = ObjectiveStatus::Active;
                state.objective.assigned_handler = Some(capability.clone());

                self.ledger.checkpoint(&state.snapshot).await?;

                info!("Objective {} routed to capability '{}'", id, capability);
                self.bus
                    .publish(Event::ObjectiveRouted {
                        objective_id: id,
                        capability: capability.clone(),
                    })
                    .await;

                Ok(PhaseResult::Routed { capability })
            }
            Err(err @ KernelError::Unrouted(_)) => {
                self.objectives
                    .set_status(&id, ObjectiveStatus::Blocked)
                    .await
                    .map_err(storage)?;
                state.objective.status = ObjectiveStatus::Blocked;

                warn!("Objective {} is unrouted: {}", id, err);
                let reason = err.to_string();
                self.bus
                    .publish(Event::ObjectiveBlocked {
                        objective_id: id,
                        reason: reason.clone(),
                    })
                    .await;

                Ok(PhaseResult::Blocked { reason })
            }
            Err(other) => Err(other),
        }
    }

    /// Run the next OODA phase for an active objective.
    async fn run_phase(&self, state: &mut CycleState) -> Result<PhaseResult, KernelError> {
        let phase = next_phase(
            state.snapshot.last_completed_phase,
            &state.snapshot.next_action_hint,
        );

        let handler_name = state
            .objective
            .assigned_handler
            .clone()
            .ok_or_else(|| KernelError::Storage("active objective without handler".to_string()))?;
        let (capability, handler) = {
            let (capability, handler) = self.registry.get(&handler_name).ok_or_else(|| {
                KernelError::Storage(format!("capability '{handler_name}' not registered"))
            })?;
            (capability.clone(), handler)
        };

        debug!(
            "Objective {} advancing into {} (iteration {}, retries {})",
            state.objective.id, phase, state.snapshot.iteration, state.snapshot.phase_retries
        );

        match phase {
            Phase::Observe => {
                let view = self.build_view(state).await?;
                match handler.observe(&view).await {
                    Ok(payload) => {
                        let value = serde_json::to_value(&payload).map_err(storage)?;
                        let mut snapshot = bump(&state.snapshot);
                        snapshot.last_completed_phase = Some(Phase::Observe);
                        snapshot.next_action_hint = "orient".to_string();
                        let entry =
                            MemoryEntry::new(&state.objective.id, Phase::Observe, value, Outcome::Success);
                        self.commit(state, entry, snapshot).await?;
                        Ok(PhaseResult::Committed {
                            phase: Phase::Observe,
                            outcome: Outcome::Success,
                        })
                    }
                    Err(e) => {
                        let payload = serde_json::json!({
                            "summary": format!("handler error: {e}"),
                            "facts": [],
                        });
                        self.phase_failure(state, Phase::Observe, payload, handler_error(e))
                            .await
                    }
                }
            }
            Phase::Orient => {
                let view = self.build_view(state).await?;
                match handler.orient(&view).await {
                    Ok(payload) => {
                        let value = serde_json::to_value(&payload).map_err(storage)?;
                        let mut snapshot = bump(&state.snapshot);
                        snapshot.last_completed_phase = Some(Phase::Orient);
                        snapshot.next_action_hint = "decide".to_string();
                        snapshot.open_questions = payload.open_questions.clone();
                        let entry =
                            MemoryEntry::new(&state.objective.id, Phase::Orient, value, Outcome::Success);
                        self.commit(state, entry, snapshot).await?;
                        Ok(PhaseResult::Committed {
                            phase: Phase::Orient,
                            outcome: Outcome::Success,
                        })
                    }
                    Err(e) => {
                        let payload = serde_json::json!({
                            "assessment": format!("handler error: {e}"),
                            "open_questions": [],
                        });
                        self.phase_failure(state, Phase::Orient, payload, handler_error(e))
                            .await
                    }
                }
            }
            Phase::Decide => {
                let view = self.build_view(state).await?;
                match handler.decide(&view).await {
                    Ok(payload) => {
                        let value = serde_json::to_value(&payload).map_err(storage)?;
                        let mut snapshot = bump(&state.snapshot);
                        snapshot.last_completed_phase = Some(Phase::Decide);
                        snapshot.next_action_hint = "act".to_string();
                        let entry =
                            MemoryEntry::new(&state.objective.id, Phase::Decide, value, Outcome::Success);
                        self.commit(state, entry, snapshot).await?;
                        state.pending_decision = Some(payload.decision);
                        Ok(PhaseResult::Committed {
                            phase: Phase::Decide,
                            outcome: Outcome::Success,
                        })
                    }
                    Err(e) => {
                        // No decision was produced; record the failed attempt
                        // as an empty invocation batch.
                        let payload = serde_json::to_value(DecisionPayload {
                            rationale: format!("handler error: {e}"),
                            decision: Decision::Invoke { requests: vec![] },
                        })
                        .map_err(storage)?;
                        self.phase_failure(state, Phase::Decide, payload, handler_error(e))
                            .await
                    }
                }
            }
            Phase::Act => self.run_act(state, &capability).await,
        }
    }

    /// ACT: execute the committed decision through the gateway.
    async fn run_act(
        &self,
        state: &mut CycleState,
        capability: &Capability,
    ) -> Result<PhaseResult, KernelError> {
        let objective_id = state.objective.id.clone();

        // No action without recorded rationale: the decision comes from the
        // committed DECIDE entry (directly, or via memory after a resume).
        let decision = match state.pending_decision.take() {
            Some(decision) => decision,
            None => {
                let entry = self
                    .memory
                    .latest_of_phase(&objective_id, Phase::Decide)
                    .await?
                    .ok_or_else(|| {
                        KernelError::Validation(
                            "ACT requires a committed DECIDE entry for the same objective"
                                .to_string(),
                        )
                    })?;
                let payload: DecisionPayload = serde_json::from_value(entry.payload)
                    .map_err(|e| KernelError::Storage(format!("corrupt DECIDE payload: {e}")))?;
                payload.decision
            }
        };

        match decision {
            Decision::Complete { summary } => {
                let payload = serde_json::to_value(ActPayload {
                    invocations: vec![],
                    note: summary.clone(),
                })
                .map_err(storage)?;
                let mut snapshot = bump(&state.snapshot);
                snapshot.last_completed_phase = Some(Phase::Act);
                snapshot.next_action_hint = "done".to_string();
                snapshot.phase_retries = 0;
                let entry =
                    MemoryEntry::new(&objective_id, Phase::Act, payload, Outcome::Success);
                self.commit(state, entry, snapshot).await?;

                self.objectives
                    .close(&objective_id, ObjectiveStatus::Done)
                    .await
                    .map_err(storage)?;
                state.objective.status = ObjectiveStatus::Done;
                self.ledger.clear(&objective_id).await?;

                info!("Objective {} completed: {}", objective_id, summary);
                self.bus
                    .publish(Event::ObjectiveCompleted {
                        objective_id,
                        summary: summary.clone(),
                    })
                    .await;

                Ok(PhaseResult::Done { summary })
            }
            Decision::Invoke { requests } => {
                let mut invocations = Vec::new();
                let mut failure: Option<KernelError> = None;

                // Invocations for one objective are sequenced; stop at the
                // first failure so the replanned cycle sees a clean prefix.
                for request in requests {
                    let invocation = self.gateway.invoke(capability, request).await;

                    self.bus
                        .publish(Event::ToolInvoked {
                            objective_id: objective_id.clone(),
                            tool: invocation.request.tool_id.clone(),
                            success: invocation.result.is_success(),
                        })
                        .await;

                    if let ToolResult::Failure { kind, message } = &invocation.result {
                        failure = Some(self.invocation_error(
                            capability,
                            &invocation.request.tool_id,
                            *kind,
                            message,
                        ));
                        invocations.push(invocation);
                        break;
                    }
                    invocations.push(invocation);
                }

                let note = match &failure {
                    None => format!("{} invocation(s) succeeded", invocations.len()),
                    Some(_) => "aborted at first failing invocation".to_string(),
                };
                let payload = serde_json::to_value(ActPayload { invocations, note })
                    .map_err(storage)?;

                match failure {
                    None => {
                        let iteration = state.snapshot.iteration + 1;
                        let mut snapshot = bump(&state.snapshot);
                        snapshot.last_completed_phase = Some(Phase::Act);
                        snapshot.next_action_hint = "observe".to_string();
                        snapshot.iteration = iteration;
                        snapshot.phase_retries = 0;
                        let entry =
                            MemoryEntry::new(&objective_id, Phase::Act, payload, Outcome::Success);
                        self.commit(state, entry, snapshot).await?;

                        if iteration >= self.limits.iteration_ceiling {
                            let err = KernelError::IterationCeilingExceeded {
                                objective_id: objective_id.clone(),
                                ceiling: self.limits.iteration_ceiling,
                            };
                            error!("{err}");
                            return self.fail_objective(state, err).await;
                        }

                        Ok(PhaseResult::Committed {
                            phase: Phase::Act,
                            outcome: Outcome::Success,
                        })
                    }
                    Some(err) => self.phase_failure(state, Phase::Act, payload, err).await,
                }
            }
        }
    }

    /// Record a failed phase attempt. Within the retry budget the objective
    /// keeps going (a failed ACT replans through ORIENT, other phases re-run);
    /// past it the objective fails and this failure entry stays the last one.
    async fn phase_failure(
        &self,
        state: &mut CycleState,
        phase: Phase,
        payload: serde_json::Value,
        err: KernelError,
    ) -> Result<PhaseResult, KernelError> {
        let attempts = state.snapshot.phase_retries + 1;

        let mut snapshot = bump(&state.snapshot);
        snapshot.phase_retries = attempts;
        if phase == Phase::Act {
            // The failed ACT still completed; the hint routes the next
            // advance into ORIENT instead of a fresh OBSERVE.
            snapshot.last_completed_phase = Some(Phase::Act);
            snapshot.next_action_hint = "replan".to_string();
        } else if snapshot.next_action_hint != "replan" {
            // A live replan hint must survive an ORIENT failure, or the
            // retry would fall back to OBSERVE; the unchanged phase re-runs
            // naturally in every other case.
            snapshot.next_action_hint = "retry".to_string();
        }

        let entry = MemoryEntry::new(&state.objective.id, phase, payload, Outcome::Failure);
        self.commit(state, entry, snapshot).await?;

        warn!(
            "Objective {} failed {} (attempt {}/{}): {}",
            state.objective.id, phase, attempts, self.limits.phase_retry_limit, err
        );

        if attempts >= self.limits.phase_retry_limit {
            return self.fail_objective(state, err).await;
        }

        Ok(PhaseResult::Committed {
            phase,
            outcome: Outcome::Failure,
        })
    }

    /// Move the objective to FAILED: archive the row, drop the live snapshot,
    /// and hand the final snapshot to the caller for manual resumption.
    async fn fail_objective(
        &self,
        state: &mut CycleState,
        err: KernelError,
    ) -> Result<PhaseResult, KernelError> {
        let objective_id = state.objective.id.clone();

        self.objectives
            .close(&objective_id, ObjectiveStatus::Failed)
            .await
            .map_err(storage)?;
        state.objective.status = ObjectiveStatus::Failed;

        let final_snapshot = state.snapshot.clone();
        self.ledger.clear(&objective_id).await?;

        error!("Objective {} failed: {}", objective_id, err);
        self.bus
            .publish(Event::ObjectiveFailed {
                objective_id,
                error: err.to_string(),
            })
            .await;

        Ok(PhaseResult::Failed {
            error: err,
            snapshot: Some(final_snapshot),
        })
    }

    /// Commit one memory entry and the updated snapshot atomically, then
    /// mirror the committed snapshot into in-process state.
    async fn commit(
        &self,
        state: &mut CycleState,
        entry: MemoryEntry,
        mut snapshot: LedgerSnapshot,
    ) -> Result<(), KernelError> {
        let seq = self.db.commit_phase(&entry, &snapshot).await?;
        snapshot.memory_cursor = seq;
        state.snapshot = snapshot;

        self.bus
            .publish(Event::PhaseCompleted {
                objective_id: state.objective.id.clone(),
                phase: entry.phase,
                outcome: entry.outcome,
            })
            .await;
        Ok(())
    }

    /// Assemble the read-only view handlers work from.
    async fn build_view(&self, state: &CycleState) -> Result<CycleView, KernelError> {
        let id = &state.objective.id;

        let last_observation = self
            .memory
            .latest_of_phase(id, Phase::Observe)
            .await?
            .and_then(|e| serde_json::from_value(e.payload).ok());
        let last_orientation = self
            .memory
            .latest_of_phase(id, Phase::Orient)
            .await?
            .and_then(|e| serde_json::from_value(e.payload).ok());
        let last_act = self
            .memory
            .latest_of_phase(id, Phase::Act)
            .await?
            .and_then(|e| serde_json::from_value(e.payload).ok());

        Ok(CycleView {
            objective_id: id.clone(),
            description: state.objective.description.clone(),
            iteration: state.snapshot.iteration,
            open_questions: state.snapshot.open_questions.clone(),
            last_observation,
            last_orientation,
            last_act,
        })
    }

    fn invocation_error(
        &self,
        capability: &Capability,
        tool: &str,
        kind: FailureKind,
        message: &str,
    ) -> KernelError {
        match kind {
            FailureKind::Timeout => KernelError::Timeout {
                tool: tool.to_string(),
                seconds: self.gateway.timeout().as_secs(),
            },
            FailureKind::PermissionDenied => KernelError::PermissionDenied {
                capability: capability.name.clone(),
                tool: tool.to_string(),
            },
            other => KernelError::ToolFailure {
                kind: other.as_str().to_string(),
                message: message.to_string(),
            },
        }
    }
}

/// Clone a snapshot and advance its monotone step counter.
fn bump(snapshot: &LedgerSnapshot) -> LedgerSnapshot {
    let mut next = snapshot.clone();
    next.step += 1;
    next
}

fn storage<E: std::fmt::Display>(e: E) -> KernelError {
    KernelError::Storage(e.to_string())
}

fn handler_error(e: sdk::HandlerError) -> KernelError {
    KernelError::ToolFailure {
        kind: "handler".to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PlaybookHandler;
    use async_trait::async_trait;
    use sdk::{ArgKind, ArgSpec, Tool, ToolError, ToolRequest};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct TickTool;

    #[async_trait]
    impl Tool for TickTool {
        fn id(&self) -> &str {
            "tick"
        }

        fn description(&self) -> &str {
            "succeeds and reports its label"
        }

        fn argument_schema(&self) -> Vec<ArgSpec> {
            vec![ArgSpec::optional("label", ArgKind::String)]
        }

        async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
            Ok(json!({"label": request.arg_str_opt("label").unwrap_or_default()}))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn id(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always errors"
        }

        fn argument_schema(&self) -> Vec<ArgSpec> {
            vec![]
        }

        async fn invoke(&self, _request: ToolRequest) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::Execution("exit status 1".to_string()))
        }
    }

    async fn kernel(playbook: Vec<ToolRequest>, limits: CycleLimits) -> (TempDir, CycleController) {
        let tmp = TempDir::new().unwrap();
        let db = Arc::new(Database::new(&tmp.path().join("test.db")).await.unwrap());

        let mut registry = CapabilityRegistry::new();
        registry
            .register(
                Capability::new("worker", &[r"\bwork\b"], &["tick", "broken"], 0).unwrap(),
                Arc::new(PlaybookHandler::new("worker", playbook)),
            )
            .unwrap();

        let mut gateway = ToolGateway::new(Duration::from_secs(5));
        gateway.register(Arc::new(TickTool));
        gateway.register(Arc::new(BrokenTool));

        let controller = CycleController::new(
            db,
            Arc::new(registry),
            Arc::new(gateway),
            Arc::new(MessageBus::new()),
            limits,
        );
        (tmp, controller)
    }

    fn tick(label: &str) -> ToolRequest {
        ToolRequest::new("tick").with_arg("label", json!(label))
    }

    #[tokio::test]
    async fn test_submit_and_route() {
        let (_tmp, controller) = kernel(vec![], CycleLimits::default()).await;

        let handle = controller.submit("do the work", 0).await.unwrap();
        let result = controller.advance(&handle).await.unwrap();

        match result {
            PhaseResult::Routed { capability } => assert_eq!(capability, "worker"),
            other => panic!("expected Routed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unrouted_objective_blocks() {
        let (_tmp, controller) = kernel(vec![], CycleLimits::default()).await;

        let handle = controller.submit("water the plants", 0).await.unwrap();
        let result = controller.advance(&handle).await.unwrap();

        assert!(matches!(result, PhaseResult::Blocked { .. }));

        // Advancing a blocked objective stays blocked
        let again = controller.advance(&handle).await.unwrap();
        assert!(matches!(again, PhaseResult::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_full_cycle_to_done() {
        let (_tmp, controller) =
            kernel(vec![tick("only step")], CycleLimits::default()).await;

        let handle = controller.submit("do the work", 0).await.unwrap();

        let mut phases = Vec::new();
        let summary = loop {
            match controller.advance(&handle).await.unwrap() {
                PhaseResult::Routed { .. } => {}
                PhaseResult::Committed { phase, outcome } => phases.push((phase, outcome)),
                PhaseResult::Done { summary } => break summary,
                other => panic!("unexpected result {other:?}"),
            }
        };

        assert!(summary.contains("1 playbook steps"));
        // Cycle 1 runs the step, cycle 2 completes
        assert_eq!(
            phases,
            vec![
                (Phase::Observe, Outcome::Success),
                (Phase::Orient, Outcome::Success),
                (Phase::Decide, Outcome::Success),
                (Phase::Act, Outcome::Success),
                (Phase::Observe, Outcome::Success),
                (Phase::Orient, Outcome::Success),
                (Phase::Decide, Outcome::Success),
            ]
        );

        // Terminal: row archived as done, snapshot deleted, handle closed
        let row = controller.objectives.get(handle.id()).await.unwrap().unwrap();
        assert_eq!(row.status, ObjectiveStatus::Done);
        assert!(controller.ledger.resume(handle.id()).await.unwrap().is_none());
        assert!(controller.advance(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_act_failure_replans_through_orient() {
        let (_tmp, controller) = kernel(
            vec![ToolRequest::new("broken")],
            CycleLimits {
                iteration_ceiling: 16,
                phase_retry_limit: 3,
            },
        )
        .await;

        let handle = controller.submit("do the work", 0).await.unwrap();
        assert!(matches!(
            controller.advance(&handle).await.unwrap(),
            PhaseResult::Routed { .. }
        ));

        // OBSERVE, ORIENT, DECIDE succeed
        for _ in 0..3 {
            assert!(matches!(
                controller.advance(&handle).await.unwrap(),
                PhaseResult::Committed {
                    outcome: Outcome::Success,
                    ..
                }
            ));
        }

        // ACT fails but the objective keeps going
        match controller.advance(&handle).await.unwrap() {
            PhaseResult::Committed { phase, outcome } => {
                assert_eq!(phase, Phase::Act);
                assert_eq!(outcome, Outcome::Failure);
            }
            other => panic!("expected committed ACT failure, got {other:?}"),
        }

        // Replan: next phase is ORIENT, not OBSERVE
        match controller.advance(&handle).await.unwrap() {
            PhaseResult::Committed { phase, .. } => assert_eq!(phase, Phase::Orient),
            other => panic!("expected ORIENT, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_honored_at_boundary() {
        let (_tmp, controller) =
            kernel(vec![tick("step")], CycleLimits::default()).await;

        let handle = controller.submit("do the work", 0).await.unwrap();
        controller.advance(&handle).await.unwrap();

        controller.terminate(&handle, "operator request").await.unwrap();

        assert!(matches!(
            controller.advance(&handle).await.unwrap(),
            PhaseResult::Cancelled
        ));

        let row = controller.objectives.get(handle.id()).await.unwrap().unwrap();
        assert_eq!(row.status, ObjectiveStatus::Blocked);
        // Snapshot is retained for a manual resume
        assert!(controller.ledger.resume(handle.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_moves_checkpoint_backward() {
        let (_tmp, controller) =
            kernel(vec![tick("step")], CycleLimits::default()).await;

        let handle = controller.submit("do the work", 0).await.unwrap();
        controller.advance(&handle).await.unwrap(); // route
        controller.advance(&handle).await.unwrap(); // observe
        controller.advance(&handle).await.unwrap(); // orient

        controller.rollback(&handle, None).await.unwrap();

        // The next advance re-runs OBSERVE
        match controller.advance(&handle).await.unwrap() {
            PhaseResult::Committed { phase, .. } => assert_eq!(phase, Phase::Observe),
            other => panic!("expected OBSERVE after rollback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_handle_rejected() {
        let (_tmp, controller) = kernel(vec![], CycleLimits::default()).await;

        let bogus = ObjectiveHandle::new("nope");
        assert!(matches!(
            controller.advance(&bogus).await.unwrap_err(),
            KernelError::UnknownObjective(_)
        ));
    }
}
