//! Handler (persona) contract
//!
//! A handler is the injected, replaceable brain behind a capability. The
//! controller calls it once per phase with a read-only [`CycleView`] and
//! records whatever it returns; the handler never touches storage or tools
//! directly. ACT is executed by the controller itself, through the gateway,
//! from the decision the handler produced.

use crate::types::{CycleView, DecisionPayload, ObservationPayload, OrientationPayload};
use async_trait::async_trait;

/// Error returned by a handler phase. Treated by the controller as a failure
/// of that phase, subject to bounded retry.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Trait implemented by every capability handler.
///
/// Implementations should derive their behavior entirely from the view, so a
/// resumed objective picks up exactly where an uninterrupted one would be.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handler name; matches the capability it is registered under.
    fn name(&self) -> &str;

    /// OBSERVE: report current state relevant to the objective.
    async fn observe(&self, view: &CycleView) -> Result<ObservationPayload, HandlerError>;

    /// ORIENT: assess the observation and surface open questions.
    async fn orient(&self, view: &CycleView) -> Result<OrientationPayload, HandlerError>;

    /// DECIDE: produce the next batch of tool requests, or signal completion,
    /// together with the rationale that will be recorded ahead of ACT.
    async fn decide(&self, view: &CycleView) -> Result<DecisionPayload, HandlerError>;
}
