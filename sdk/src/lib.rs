//! Cadence SDK
//!
//! Shared contracts between the Cadence kernel and its external collaborators:
//! the data model of a decision cycle, the error surface, the tool invocation
//! boundary, and the handler (persona) interface.
//!
//! Everything the engine exchanges with code it does not own lives here, so
//! that tools and handlers can be written against this crate alone.

pub mod errors;
pub mod handler;
pub mod tool;
pub mod types;

pub use errors::{KernelError, KernelErrorExt};
pub use handler::{Handler, HandlerError};
pub use tool::{validate_args, ArgKind, ArgSpec, Tool};
pub use types::{
    validate_payload, ActPayload, CycleView, Decision, DecisionPayload, FailureKind,
    LedgerSnapshot, ObservationPayload, OrientationPayload, Outcome, Phase, ToolError,
    ToolInvocation, ToolRequest, ToolResult, LEDGER_FORMAT_VERSION,
};
