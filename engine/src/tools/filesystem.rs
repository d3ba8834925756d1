//! Filesystem tools
//!
//! Native filesystem operations for reading and writing files within the
//! workspace. Every path is resolved against the workspace root and must stay
//! inside it; absolute paths and `..` escapes are rejected before any I/O.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use sdk::{ArgKind, ArgSpec, Tool, ToolError, ToolRequest};

/// Resolve a relative path inside the workspace, rejecting escapes.
fn resolve(workspace: &Path, path: &str) -> Result<PathBuf, ToolError> {
    let target = Path::new(path);
    if target.is_absolute() {
        return Err(ToolError::InvalidParameter(format!(
            "path must be relative to the workspace: {path}"
        )));
    }

    // Lexical containment check; works for files that don't exist yet
    let mut depth: i32 = 0;
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(ToolError::InvalidParameter(format!(
                        "path escapes the workspace: {path}"
                    )));
                }
            }
            Component::CurDir => {}
            _ => {
                return Err(ToolError::InvalidParameter(format!("invalid path: {path}")));
            }
        }
    }

    Ok(workspace.join(target))
}

/// Read the contents of a file within the workspace.
pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn id(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents from the workspace"
    }

    fn argument_schema(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::required("path", ArgKind::String)]
    }

    async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
        let path = request.arg_str("path")?;
        let resolved = resolve(&self.workspace, &path)?;

        info!("Reading file: {}", resolved.display());
        let content = fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::Execution(format!("failed to read {path}: {e}")))?;

        debug!("Read {} bytes from {}", content.len(), resolved.display());
        Ok(json!({"path": path, "content": content}))
    }
}

/// Write content to a file within the workspace, creating parent directories
/// as needed.
pub struct WriteFileTool {
    workspace: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn id(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace"
    }

    fn argument_schema(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec::required("path", ArgKind::String),
            ArgSpec::required("content", ArgKind::String),
        ]
    }

    async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
        let path = request.arg_str("path")?;
        let content = request.arg_str("content")?;
        let resolved = resolve(&self.workspace, &path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Execution(format!("failed to create {path} parents: {e}")))?;
        }

        info!("Writing {} bytes to: {}", content.len(), resolved.display());
        fs::write(&resolved, &content)
            .await
            .map_err(|e| ToolError::Execution(format!("failed to write {path}: {e}")))?;

        Ok(json!({"path": path, "bytes_written": content.len()}))
    }
}

/// List files and directories at a path within the workspace.
pub struct ListDirTool {
    workspace: PathBuf,
}

impl ListDirTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn id(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List entries of a workspace directory"
    }

    fn argument_schema(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::optional("path", ArgKind::String)]
    }

    async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
        let path = request.arg_str_opt("path").unwrap_or_else(|| ".".to_string());
        let resolved = resolve(&self.workspace, &path)?;

        info!("Listing directory: {}", resolved.display());
        let mut reader = fs::read_dir(&resolved)
            .await
            .map_err(|e| ToolError::Execution(format!("failed to list {path}: {e}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
            let kind = if metadata.is_dir() { "dir" } else { "file" };
            entries.push(json!({"name": name, "kind": kind, "size": metadata.len()}));
        }

        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(json!({"path": path, "entries": entries}))
    }
}
