//! Capability Router
//!
//! Classifies an incoming objective and selects the registered capability
//! (persona) responsible for it. Capabilities are registered once at startup
//! and read-only afterwards. Matching is deterministic: every trigger pattern
//! is tried, the highest priority wins, ties fall back to registration order,
//! first match wins. The matching algorithm itself is pluggable through
//! [`IntentClassifier`]; the default is regex-based.

use anyhow::{bail, Result};
use regex::RegexBuilder;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use sdk::{Handler, KernelError};

/// A registered handler plus its routing patterns and permitted tools.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub trigger_patterns: Vec<regex::Regex>,
    pub tool_permissions: HashSet<String>,
    pub priority: i32,
}

impl Capability {
    /// Build a capability, compiling its trigger patterns case-insensitively.
    pub fn new(
        name: impl Into<String>,
        patterns: &[&str],
        permissions: &[&str],
        priority: i32,
    ) -> Result<Self> {
        let mut trigger_patterns = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| anyhow::anyhow!("invalid trigger pattern '{pattern}': {e}"))?;
            trigger_patterns.push(compiled);
        }

        Ok(Self {
            name: name.into(),
            trigger_patterns,
            tool_permissions: permissions.iter().map(|s| s.to_string()).collect(),
            priority,
        })
    }

    /// True if any trigger pattern matches the description.
    pub fn matches(&self, description: &str) -> bool {
        self.trigger_patterns.iter().any(|p| p.is_match(description))
    }

    /// True if this capability may invoke the given tool.
    pub fn permits(&self, tool_id: &str) -> bool {
        self.tool_permissions.contains(tool_id)
    }
}

struct Registered {
    capability: Capability,
    handler: Arc<dyn Handler>,
}

/// Static registry of capabilities and their handlers. Populated at startup,
/// immutable for the process lifetime once handed to the router.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Registered>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability with its handler. Names must be unique.
    pub fn register(&mut self, capability: Capability, handler: Arc<dyn Handler>) -> Result<()> {
        if self.entries.iter().any(|e| e.capability.name == capability.name) {
            bail!("capability '{}' is already registered", capability.name);
        }
        debug!(
            "Registered capability '{}' (priority {}, {} patterns)",
            capability.name,
            capability.priority,
            capability.trigger_patterns.len()
        );
        self.entries.push(Registered { capability, handler });
        Ok(())
    }

    /// All capabilities in registration order.
    pub fn capabilities(&self) -> Vec<&Capability> {
        self.entries.iter().map(|e| &e.capability).collect()
    }

    /// Look up a capability and its handler by name.
    pub fn get(&self, name: &str) -> Option<(&Capability, Arc<dyn Handler>)> {
        self.entries
            .iter()
            .find(|e| e.capability.name == name)
            .map(|e| (&e.capability, Arc::clone(&e.handler)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pluggable classification function: description in, selected capability
/// index out. Must be deterministic for an unchanged description and
/// capability list.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, description: &str, capabilities: &[&Capability]) -> Option<usize>;
}

/// Default classifier: trigger-pattern matching with priority descending and
/// registration order as tiebreak.
pub struct PatternClassifier;

impl IntentClassifier for PatternClassifier {
    fn classify(&self, description: &str, capabilities: &[&Capability]) -> Option<usize> {
        capabilities
            .iter()
            .enumerate()
            .filter(|(_, c)| c.matches(description))
            .min_by_key(|(i, c)| (Reverse(c.priority), *i))
            .map(|(i, _)| i)
    }
}

/// Routes objectives to capabilities.
pub struct CapabilityRouter {
    registry: Arc<CapabilityRegistry>,
    classifier: Box<dyn IntentClassifier>,
}

impl CapabilityRouter {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self::with_classifier(registry, Box::new(PatternClassifier))
    }

    pub fn with_classifier(
        registry: Arc<CapabilityRegistry>,
        classifier: Box<dyn IntentClassifier>,
    ) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    /// Select the capability responsible for a description. Idempotent for an
    /// unchanged description and registry. Fails with `Unrouted` when nothing
    /// matches.
    pub fn route(&self, description: &str) -> Result<String, KernelError> {
        let capabilities = self.registry.capabilities();
        match self.classifier.classify(description, &capabilities) {
            Some(index) => {
                let name = capabilities[index].name.clone();
                debug!("Routed '{}' to capability '{}'", description, name);
                Ok(name)
            }
            None => Err(KernelError::Unrouted(description.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::{
        CycleView, Decision, DecisionPayload, HandlerError, ObservationPayload, OrientationPayload,
    };

    struct NullHandler(&'static str);

    #[async_trait]
    impl Handler for NullHandler {
        fn name(&self) -> &str {
            self.0
        }

        async fn observe(&self, _view: &CycleView) -> Result<ObservationPayload, HandlerError> {
            Ok(ObservationPayload::default())
        }

        async fn orient(&self, _view: &CycleView) -> Result<OrientationPayload, HandlerError> {
            Ok(OrientationPayload::default())
        }

        async fn decide(&self, _view: &CycleView) -> Result<DecisionPayload, HandlerError> {
            Ok(DecisionPayload {
                rationale: "nothing to do".to_string(),
                decision: Decision::Complete {
                    summary: "noop".to_string(),
                },
            })
        }
    }

    fn registry() -> Arc<CapabilityRegistry> {
        let mut reg = CapabilityRegistry::new();
        reg.register(
            Capability::new("coder", &[r"\bfix\b", r"\bimplement\b"], &["write_file"], 5).unwrap(),
            Arc::new(NullHandler("coder")),
        )
        .unwrap();
        reg.register(
            Capability::new("qa", &[r"\btest\b"], &["run_command"], 10).unwrap(),
            Arc::new(NullHandler("qa")),
        )
        .unwrap();
        reg.register(
            Capability::new("reviewer", &[r"\btest\b"], &["read_file"], 10).unwrap(),
            Arc::new(NullHandler("reviewer")),
        )
        .unwrap();
        Arc::new(reg)
    }

    #[test]
    fn test_route_by_pattern() {
        let router = CapabilityRouter::new(registry());
        assert_eq!(router.route("implement the parser").unwrap(), "coder");
    }

    #[test]
    fn test_priority_wins_over_registration_order() {
        // "fix failing test" matches coder (priority 5) and qa (priority 10)
        let router = CapabilityRouter::new(registry());
        assert_eq!(router.route("fix failing test in module X").unwrap(), "qa");
    }

    #[test]
    fn test_tie_broken_by_registration_order() {
        // qa and reviewer both match "test" at priority 10; qa registered first
        let router = CapabilityRouter::new(registry());
        assert_eq!(router.route("test the build").unwrap(), "qa");
    }

    #[test]
    fn test_unrouted() {
        let router = CapabilityRouter::new(registry());
        let err = router.route("water the plants").unwrap_err();
        assert!(matches!(err, KernelError::Unrouted(_)));
    }

    #[test]
    fn test_route_is_idempotent() {
        let router = CapabilityRouter::new(registry());
        let first = router.route("fix failing test in module X").unwrap();
        let second = router.route("fix failing test in module X").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let router = CapabilityRouter::new(registry());
        assert_eq!(router.route("FIX the login page").unwrap(), "coder");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut reg = CapabilityRegistry::new();
        reg.register(
            Capability::new("coder", &["fix"], &[], 0).unwrap(),
            Arc::new(NullHandler("coder")),
        )
        .unwrap();
        let err = reg.register(
            Capability::new("coder", &["other"], &[], 0).unwrap(),
            Arc::new(NullHandler("coder")),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_permissions() {
        let cap = Capability::new("qa", &["test"], &["run_command", "read_file"], 0).unwrap();
        assert!(cap.permits("run_command"));
        assert!(!cap.permits("write_file"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(Capability::new("broken", &["("], &[], 0).is_err());
    }

    struct FirstClassifier;

    impl IntentClassifier for FirstClassifier {
        fn classify(&self, _description: &str, capabilities: &[&Capability]) -> Option<usize> {
            if capabilities.is_empty() {
                None
            } else {
                Some(0)
            }
        }
    }

    #[test]
    fn test_classifier_is_pluggable() {
        let router = CapabilityRouter::with_classifier(registry(), Box::new(FirstClassifier));
        // FirstClassifier ignores patterns entirely
        assert_eq!(router.route("water the plants").unwrap(), "coder");
    }
}
