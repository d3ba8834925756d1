//! Kernel data model
//!
//! The types exchanged between the cycle controller, the tool gateway, and
//! externally supplied handlers: phases and outcomes, per-phase payload
//! schemas, tool requests and tagged invocation results, and the continuity
//! ledger snapshot format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current on-disk format of [`LedgerSnapshot`].
///
/// Bumped whenever the snapshot shape changes so an external process can
/// inspect or migrate persisted records.
pub const LEDGER_FORMAT_VERSION: u32 = 1;

/// Phases of one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Observe,
    Orient,
    Decide,
    Act,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Observe => "OBSERVE",
            Phase::Orient => "ORIENT",
            Phase::Decide => "DECIDE",
            Phase::Act => "ACT",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "OBSERVE" => Some(Phase::Observe),
            "ORIENT" => Some(Phase::Orient),
            "DECIDE" => Some(Phase::Decide),
            "ACT" => Some(Phase::Act),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded outcome of a committed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Success,
    Failure,
    Pending,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
            Outcome::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Outcome> {
        match s {
            "SUCCESS" => Some(Outcome::Success),
            "FAILURE" => Some(Outcome::Failure),
            "PENDING" => Some(Outcome::Pending),
            _ => None,
        }
    }
}

/// A request for one tool call: tool id plus named JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_id: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
}

impl ToolRequest {
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            args: HashMap::new(),
        }
    }

    /// Add an argument (builder style).
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Get a string argument
    pub fn arg_str(&self, key: &str) -> Result<String, ToolError> {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an i64 argument
    pub fn arg_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.args
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get a bool argument
    pub fn arg_bool(&self, key: &str) -> Result<bool, ToolError> {
        self.args
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional string argument
    pub fn arg_str_opt(&self, key: &str) -> Option<String> {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

/// Errors a tool implementation may return from `invoke`.
///
/// The gateway converts these into tagged [`ToolResult::Failure`] values;
/// they never cross the gateway boundary as raw errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Failure classification for a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PermissionDenied,
    Timeout,
    InvalidArguments,
    UnknownTool,
    Panicked,
    ToolError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::UnknownTool => "unknown_tool",
            FailureKind::Panicked => "panicked",
            FailureKind::ToolError => "tool_error",
        }
    }
}

/// Tagged result of a tool invocation. Success carries the tool's typed
/// payload; failure carries a kind and a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { payload: serde_json::Value },
    Failure { kind: FailureKind, message: String },
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ToolResult::Failure { kind, .. } => Some(*kind),
            ToolResult::Success { .. } => None,
        }
    }
}

/// One completed request/response pair, recorded by the gateway per call.
/// Immutable once recorded; retry policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub request: ToolRequest,
    pub result: ToolResult,
    pub duration_ms: u64,
}

/// A handler's decision at the close of the DECIDE phase: either a batch of
/// tool requests to execute in ACT, or the completion signal that ends the
/// objective's cycle loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Invoke { requests: Vec<ToolRequest> },
    Complete { summary: String },
}

/// OBSERVE payload: what the handler saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationPayload {
    pub summary: String,
    #[serde(default)]
    pub facts: Vec<String>,
}

/// ORIENT payload: the handler's assessment plus whatever is still unresolved.
/// The open questions are mirrored into the ledger snapshot at checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrientationPayload {
    pub assessment: String,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

/// DECIDE payload: the recorded rationale for the upcoming ACT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionPayload {
    pub rationale: String,
    pub decision: Decision,
}

/// ACT payload: the invocations executed this phase and a closing note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActPayload {
    #[serde(default)]
    pub invocations: Vec<ToolInvocation>,
    #[serde(default)]
    pub note: String,
}

/// Validate a raw payload against the schema expected for `phase`.
///
/// Used by the memory store on append: a payload that does not deserialize
/// into the phase's struct is rejected before anything is written.
pub fn validate_payload(phase: Phase, payload: &serde_json::Value) -> Result<(), serde_json::Error> {
    match phase {
        Phase::Observe => {
            serde_json::from_value::<ObservationPayload>(payload.clone()).map(|_| ())
        }
        Phase::Orient => serde_json::from_value::<OrientationPayload>(payload.clone()).map(|_| ()),
        Phase::Decide => serde_json::from_value::<DecisionPayload>(payload.clone()).map(|_| ()),
        Phase::Act => serde_json::from_value::<ActPayload>(payload.clone()).map(|_| ()),
    }
}

/// Compact, resumable snapshot of one objective's cycle state.
///
/// Exactly one live snapshot exists per active objective. It is overwritten
/// at each phase boundary and deleted when the objective reaches a terminal
/// status. `step` counts committed checkpoints and only ever increases,
/// except through an explicit rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub format_version: u32,
    pub objective_id: String,
    pub last_completed_phase: Option<Phase>,
    /// Insertion-order id of the last committed memory entry for this
    /// objective; a resume replays memory strictly after this point.
    pub memory_cursor: i64,
    pub open_questions: Vec<String>,
    pub next_action_hint: String,
    /// Completed OBSERVE→ACT cycles.
    pub iteration: u32,
    /// Consecutive failures of the phase currently being retried.
    pub phase_retries: u32,
    /// Monotone checkpoint counter.
    pub step: u64,
}

impl LedgerSnapshot {
    /// Snapshot for a freshly routed objective: nothing committed yet.
    pub fn initial(objective_id: impl Into<String>) -> Self {
        Self {
            format_version: LEDGER_FORMAT_VERSION,
            objective_id: objective_id.into(),
            last_completed_phase: None,
            memory_cursor: 0,
            open_questions: Vec::new(),
            next_action_hint: "observe".to_string(),
            iteration: 0,
            phase_retries: 0,
            step: 0,
        }
    }
}

/// Read-only view of an objective's in-flight state, assembled by the
/// controller and passed to handlers each phase. Handlers derive everything
/// from this view so that a resumed objective behaves identically to an
/// uninterrupted one.
#[derive(Debug, Clone, Default)]
pub struct CycleView {
    pub objective_id: String,
    pub description: String,
    pub iteration: u32,
    pub open_questions: Vec<String>,
    pub last_observation: Option<ObservationPayload>,
    pub last_orientation: Option<OrientationPayload>,
    pub last_act: Option<ActPayload>,
}
