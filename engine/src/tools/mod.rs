//! Built-in native tools
//!
//! The tools the engine ships with: workspace-guarded filesystem access and
//! command execution. Like any external tool they implement the SDK `Tool`
//! trait and are only reachable through the gateway.

pub mod filesystem;
pub mod terminal;

pub use filesystem::{ListDirTool, ReadFileTool, WriteFileTool};
pub use terminal::RunCommandTool;

use crate::gateway::ToolGateway;
use std::path::Path;
use std::sync::Arc;

/// Register every built-in tool, rooted at the given workspace.
pub fn register_builtin(gateway: &mut ToolGateway, workspace: &Path) {
    gateway.register(Arc::new(ReadFileTool::new(workspace)));
    gateway.register(Arc::new(WriteFileTool::new(workspace)));
    gateway.register(Arc::new(ListDirTool::new(workspace)));
    gateway.register(Arc::new(RunCommandTool::new(workspace)));
}
