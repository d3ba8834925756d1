//! Tool contract
//!
//! This module defines the `Tool` trait that every external capability must
//! implement to be registered with the gateway, plus the declarative argument
//! schema the gateway validates requests against before dispatch. The gateway
//! is the only boundary to the outside world; a tool never talks to the
//! kernel directly.

use crate::types::{ToolError, ToolRequest};
use async_trait::async_trait;

/// Kind of a declared tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
    Json,
}

/// One declared argument of a tool.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Trait implemented by every tool registered with the gateway.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier the router's permission sets refer to.
    fn id(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str;

    /// Declared argument schema, validated by the gateway before dispatch.
    fn argument_schema(&self) -> Vec<ArgSpec>;

    /// Execute the tool. Errors are returned as values; the gateway converts
    /// them into tagged failures and enforces the invocation deadline.
    async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError>;
}

/// Validate a request against a declared schema: required arguments must be
/// present and every supplied argument must match its declared kind.
pub fn validate_args(schema: &[ArgSpec], request: &ToolRequest) -> Result<(), ToolError> {
    for spec in schema {
        match request.args.get(spec.name) {
            None => {
                if spec.required {
                    return Err(ToolError::MissingParameter(spec.name.to_string()));
                }
            }
            Some(value) => {
                let ok = match spec.kind {
                    ArgKind::String => value.is_string(),
                    ArgKind::Integer => value.is_i64() || value.is_u64(),
                    ArgKind::Boolean => value.is_boolean(),
                    ArgKind::Json => true,
                };
                if !ok {
                    return Err(ToolError::InvalidParameter(format!(
                        "{}: expected {:?}",
                        spec.name, spec.kind
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<ArgSpec> {
        vec![
            ArgSpec::required("path", ArgKind::String),
            ArgSpec::optional("limit", ArgKind::Integer),
        ]
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let req = ToolRequest::new("read_file")
            .with_arg("path", json!("README.md"))
            .with_arg("limit", json!(10));
        assert!(validate_args(&schema(), &req).is_ok());
    }

    #[test]
    fn test_validate_allows_missing_optional() {
        let req = ToolRequest::new("read_file").with_arg("path", json!("README.md"));
        assert!(validate_args(&schema(), &req).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let req = ToolRequest::new("read_file");
        let err = validate_args(&schema(), &req).unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(p) if p == "path"));
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let req = ToolRequest::new("read_file")
            .with_arg("path", json!(42))
            .with_arg("limit", json!(10));
        let err = validate_args(&schema(), &req).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }
}
