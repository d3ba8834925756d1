//! Tool Gateway
//!
//! The uniform invocation boundary to every side-effecting capability. A call
//! goes through four gates: the capability's permission set, tool lookup,
//! argument-schema validation, and a deadline-bounded execution that also
//! contains panics. Whatever happens underneath, `invoke` returns a tagged
//! [`ToolInvocation`] — nothing raises past this boundary, which is what
//! keeps a single bad tool call from halting the cycle loop.
//!
//! The gateway never retries. Retry policy belongs to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::router::Capability;
use sdk::{
    validate_args, FailureKind, Tool, ToolError, ToolInvocation, ToolRequest, ToolResult,
};

/// Default invocation deadline.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Registry and invocation boundary for all tools.
pub struct ToolGateway {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolGateway {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Register a tool under its id. Later registrations replace earlier ones.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!("Registered tool '{}'", tool.id());
        self.tools.insert(tool.id().to_string(), tool);
    }

    /// Ids of all registered tools, sorted.
    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    /// The configured per-invocation deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke a tool on behalf of a capability.
    ///
    /// Always returns a completed invocation record; failures of any kind
    /// (permission, lookup, arguments, deadline, panic, tool error) are
    /// captured as tagged results.
    pub async fn invoke(&self, capability: &Capability, request: ToolRequest) -> ToolInvocation {
        let start = Instant::now();
        let result = self.execute(capability, &request).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            ToolResult::Success { .. } => {
                info!(
                    "Tool '{}' succeeded for '{}' in {}ms",
                    request.tool_id, capability.name, duration_ms
                );
            }
            ToolResult::Failure { kind, message } => {
                warn!(
                    "Tool '{}' failed for '{}' ({}): {}",
                    request.tool_id,
                    capability.name,
                    kind.as_str(),
                    message
                );
            }
        }

        ToolInvocation {
            request,
            result,
            duration_ms,
        }
    }

    async fn execute(&self, capability: &Capability, request: &ToolRequest) -> ToolResult {
        if !capability.permits(&request.tool_id) {
            return ToolResult::Failure {
                kind: FailureKind::PermissionDenied,
                message: format!(
                    "tool '{}' is not in capability '{}' permissions",
                    request.tool_id, capability.name
                ),
            };
        }

        let Some(tool) = self.tools.get(&request.tool_id) else {
            return ToolResult::Failure {
                kind: FailureKind::UnknownTool,
                message: format!("no tool registered under '{}'", request.tool_id),
            };
        };

        if let Err(e) = validate_args(&tool.argument_schema(), request) {
            return ToolResult::Failure {
                kind: FailureKind::InvalidArguments,
                message: e.to_string(),
            };
        }

        // Run on a separate task so a panicking tool is contained as a join
        // error instead of unwinding through the gateway.
        let tool = Arc::clone(tool);
        let owned = request.clone();
        let mut task = tokio::spawn(async move { tool.invoke(owned).await });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Err(_elapsed) => {
                task.abort();
                ToolResult::Failure {
                    kind: FailureKind::Timeout,
                    message: format!(
                        "tool '{}' exceeded its {}s deadline",
                        request.tool_id,
                        self.timeout.as_secs()
                    ),
                }
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    ToolResult::Failure {
                        kind: FailureKind::Panicked,
                        message: format!("tool '{}' panicked", request.tool_id),
                    }
                } else {
                    ToolResult::Failure {
                        kind: FailureKind::ToolError,
                        message: format!("tool '{}' was cancelled", request.tool_id),
                    }
                }
            }
            Ok(Ok(Ok(payload))) => ToolResult::Success { payload },
            Ok(Ok(Err(tool_err))) => {
                let kind = match tool_err {
                    ToolError::MissingParameter(_) | ToolError::InvalidParameter(_) => {
                        FailureKind::InvalidArguments
                    }
                    ToolError::Execution(_) => FailureKind::ToolError,
                };
                ToolResult::Failure {
                    kind,
                    message: tool_err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::{ArgKind, ArgSpec};
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn id(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "returns its text argument"
        }

        fn argument_schema(&self) -> Vec<ArgSpec> {
            vec![ArgSpec::required("text", ArgKind::String)]
        }

        async fn invoke(&self, request: ToolRequest) -> Result<serde_json::Value, ToolError> {
            Ok(json!({"text": request.arg_str("text")?}))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn id(&self) -> &str {
            "panic"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn argument_schema(&self) -> Vec<ArgSpec> {
            vec![]
        }

        async fn invoke(&self, _request: ToolRequest) -> Result<serde_json::Value, ToolError> {
            panic!("boom");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn id(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps past any reasonable deadline"
        }

        fn argument_schema(&self) -> Vec<ArgSpec> {
            vec![]
        }

        async fn invoke(&self, _request: ToolRequest) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!({}))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn id(&self) -> &str {
            "fail"
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

    fn gateway() -> ToolGateway {
        let mut gw = ToolGateway::new(Duration::from_millis(200));
        gw.register(Arc::new(EchoTool));
        gw.register(Arc::new(PanicTool));
        gw.register(Arc::new(SlowTool));
        gw.register(Arc::new(FailTool));
        gw
    }

    fn capability(tools: &[&str]) -> Capability {
        Capability::new("tester", &["."], tools, 0).unwrap()
    }

    #[tokio::test]
    async fn test_successful_invocation() {
        let gw = gateway();
        let cap = capability(&["echo"]);

        let invocation = gw
            .invoke(&cap, ToolRequest::new("echo").with_arg("text", json!("hi")))
            .await;

        assert!(invocation.result.is_success());
        match invocation.result {
            ToolResult::Success { payload } => assert_eq!(payload, json!({"text": "hi"})),
            ToolResult::Failure { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let gw = gateway();
        let cap = capability(&["echo"]);

        let invocation = gw.invoke(&cap, ToolRequest::new("fail")).await;
        assert_eq!(
            invocation.result.failure_kind(),
            Some(FailureKind::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let gw = gateway();
        let cap = capability(&["missing"]);

        let invocation = gw.invoke(&cap, ToolRequest::new("missing")).await;
        assert_eq!(
            invocation.result.failure_kind(),
            Some(FailureKind::UnknownTool)
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let gw = gateway();
        let cap = capability(&["echo"]);

        let invocation = gw.invoke(&cap, ToolRequest::new("echo")).await;
        assert_eq!(
            invocation.result.failure_kind(),
            Some(FailureKind::InvalidArguments)
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let gw = gateway();
        let cap = capability(&["panic"]);

        let invocation = gw.invoke(&cap, ToolRequest::new("panic")).await;
        assert_eq!(
            invocation.result.failure_kind(),
            Some(FailureKind::Panicked)
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let gw = gateway();
        let cap = capability(&["slow"]);

        let invocation = gw.invoke(&cap, ToolRequest::new("slow")).await;
        assert_eq!(invocation.result.failure_kind(), Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_tool_error_is_tagged() {
        let gw = gateway();
        let cap = capability(&["fail"]);

        let invocation = gw.invoke(&cap, ToolRequest::new("fail")).await;
        match invocation.result {
            ToolResult::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::ToolError);
                assert!(message.contains("exit status 1"));
            }
            ToolResult::Success { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_tool_ids_sorted() {
        let gw = gateway();
        assert_eq!(gw.tool_ids(), vec!["echo", "fail", "panic", "slow"]);
        assert!(gw.contains("echo"));
        assert!(!gw.contains("other"));
    }
}
