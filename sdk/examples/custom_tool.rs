//! Minimal example of implementing the `Tool` contract.
//!
//! Run with: cargo run --example custom_tool -p sdk

use async_trait::async_trait;
use sdk::{validate_args, ArgKind, ArgSpec, Tool, ToolError, ToolRequest};
use serde_json::json;

/// A tool that uppercases its input.
struct ShoutTool;

#[async_trait]
impl Tool for ShoutTool {
    fn id(&self) -> &str {
        "shout"
    }

    fn description(&self) -> &str {
        "Uppercase the given text"
    }

    fn argument_schema(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::required("text", ArgKind::String)]
    }

    async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
        let text = request.arg_str("text")?;
        Ok(json!({"text": text.to_uppercase()}))
    }
}

fn main() {
    let tool = ShoutTool;

    println!("tool: {} — {}", tool.id(), tool.description());
    for spec in tool.argument_schema() {
        println!(
            "  arg {} ({:?}, {})",
            spec.name,
            spec.kind,
            if spec.required { "required" } else { "optional" }
        );
    }

    // The gateway validates requests against the schema before dispatch;
    // the same helper is available to tool authors.
    let good = ToolRequest::new("shout").with_arg("text", json!("hello"));
    assert!(validate_args(&tool.argument_schema(), &good).is_ok());

    let bad = ToolRequest::new("shout").with_arg("text", json!(42));
    assert!(validate_args(&tool.argument_schema(), &bad).is_err());

    println!("request validation behaves as expected");
}
