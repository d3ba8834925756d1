//! Terminal tool
//!
//! Native execution of commands inside the workspace. The command string is
//! parsed into program + arguments and run directly (no shell), with stdout
//! and stderr captured. A non-zero exit status is a tool error, which the
//! gateway records as a tagged failure; the gateway's deadline bounds
//! runaway commands.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use sdk::{ArgKind, ArgSpec, Tool, ToolError, ToolRequest};

pub struct RunCommandTool {
    workdir: PathBuf,
}

impl RunCommandTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn id(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a command in the workspace and capture its output"
    }

    fn argument_schema(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::required("command", ArgKind::String)]
    }

    async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
        let command = request.arg_str("command")?;

        let parts: Vec<&str> = command.split_whitespace().collect();
        let Some((program, args)) = parts.split_first() else {
            return Err(ToolError::InvalidParameter("empty command".to_string()));
        };

        info!("Executing command: {}", command);

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to start '{program}': {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            warn!("Command failed with {}: {}", output.status, command);
            return Err(ToolError::Execution(format!(
                "command exited with {}: {}",
                output.status,
                if stderr.is_empty() { &stdout } else { &stderr }
            )));
        }

        Ok(json!({
            "stdout": stdout,
            "stderr": stderr,
            "status": output.status.code().unwrap_or(0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_command_captures_stdout() {
        let tmp = TempDir::new().unwrap();
        let tool = RunCommandTool::new(tmp.path());

        let result = tool
            .invoke(ToolRequest::new("run_command").with_arg("command", json!("echo hello")))
            .await
            .unwrap();

        assert_eq!(result["status"], json!(0));
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let tool = RunCommandTool::new(tmp.path());

        let err = tool
            .invoke(ToolRequest::new("run_command").with_arg("command", json!("false")))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let tool = RunCommandTool::new(tmp.path());

        let err = tool
            .invoke(
                ToolRequest::new("run_command")
                    .with_arg("command", json!("definitely-not-a-real-binary")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let tmp = TempDir::new().unwrap();
        let tool = RunCommandTool::new(tmp.path());

        let err = tool
            .invoke(ToolRequest::new("run_command").with_arg("command", json!("   ")))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();
        let tool = RunCommandTool::new(tmp.path());

        let result = tool
            .invoke(ToolRequest::new("run_command").with_arg("command", json!("ls")))
            .await
            .unwrap();
        assert!(result["stdout"].as_str().unwrap().contains("marker.txt"));
    }
}
