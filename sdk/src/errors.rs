//! Error types and handling
//!
//! This module provides the typed error surface of the Cadence kernel. All
//! errors crossing the `advance`/`invoke` boundaries are one of these kinds;
//! internal failures are converted before they reach a caller.

use thiserror::Error;

/// Trait for kernel error extensions
///
/// Provides additional context for errors: a user-facing hint and whether the
/// kernel's propagation policy treats the kind as recoverable (eligible for
/// bounded retry/replan) or terminal for the objective.
pub trait KernelErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable kinds fail the single phase or invocation and are subject
    /// to bounded retry. Non-recoverable kinds are terminal for the objective
    /// and are never retried automatically.
    fn is_recoverable(&self) -> bool;
}

/// Kernel error surface
///
/// The tagged error kinds a caller of `advance` or `invoke` can observe.
/// `Storage` and `UnknownObjective` are ambient kinds beyond the domain set:
/// a persistent kernel has a persistence layer that can fail, and handles can
/// outlive the objectives they point at.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A memory entry payload did not match the schema for its phase.
    #[error("Payload validation failed: {0}")]
    Validation(String),

    /// A capability requested a tool outside its permitted set.
    #[error("Tool '{tool}' not permitted for capability '{capability}'")]
    PermissionDenied { capability: String, tool: String },

    /// A tool exceeded its invocation deadline.
    #[error("Tool '{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// No registered capability matches the objective description.
    #[error("No capability matches objective: {0}")]
    Unrouted(String),

    /// The cycle loop safeguard triggered.
    #[error("Objective {objective_id} reached the iteration ceiling ({ceiling})")]
    IterationCeilingExceeded { objective_id: String, ceiling: u32 },

    /// A wrapped underlying tool error.
    #[error("Tool failure ({kind}): {message}")]
    ToolFailure { kind: String, message: String },

    /// The persistence layer failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The handle does not refer to an advanceable objective.
    #[error("Unknown or closed objective: {0}")]
    UnknownObjective(String),
}

impl KernelErrorExt for KernelError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Validation(_) => "A phase produced a malformed record. The phase will be retried",
            Self::PermissionDenied { .. } => {
                "The capability is not allowed to use this tool. Check its tool_permissions"
            }
            Self::Timeout { .. } => "The tool took too long. It may be retried",
            Self::Unrouted(_) => {
                "No capability matches this objective. Register one or adjust trigger patterns"
            }
            Self::IterationCeilingExceeded { .. } => {
                "The objective looped too many times. Inspect its memory and resume manually"
            }
            Self::ToolFailure { .. } => "A tool call failed. It may be retried",
            Self::Storage(_) => "Database operation failed. Check the data directory",
            Self::UnknownObjective(_) => "The objective is unknown or already closed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Terminal for the objective, never retried automatically
            Self::Unrouted(_)
            | Self::IterationCeilingExceeded { .. }
            | Self::Storage(_)
            | Self::UnknownObjective(_) => false,

            // Fatal to the single invocation/entry, eligible for bounded
            // retry/replan at the controller
            Self::Validation(_)
            | Self::PermissionDenied { .. }
            | Self::Timeout { .. }
            | Self::ToolFailure { .. } => true,
        }
    }
}
